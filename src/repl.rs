//! The REPL: a plain, deterministic read-eval-print loop over standard input.
//!
//! No line editor, no history file, no raw terminal mode — every prompt, input line, and
//! result line is exactly the bytes the statement grammar calls for, since tooling built
//! on top of this REPL (tests included) depends on byte-exact output.

use crate::errors::Error;
use crate::storage::{InsertOutcome, Row, Tree};
use std::io::{self, BufRead, Write};

const PROMPT: &str = "db> ";

pub fn run(mut tree: Tree) -> Result<(), Error> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{}", PROMPT);
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            tree.close()?;
            return Ok(());
        }
        let line = line.trim_end_matches(['\n', '\r']);

        if let Some(meta) = line.strip_prefix('.') {
            match meta {
                "exit" => {
                    tree.close()?;
                    std::process::exit(0);
                }
                "constants" => print!("{}", Tree::constants_string()),
                "btree" => print!("{}", tree.btree_string()?),
                _ => println!("Unrecognized command '{}'", line),
            }
            continue;
        }

        let mut words = line.split_whitespace();
        match words.next() {
            Some("insert") => {
                let rest: Vec<&str> = words.collect();
                match parse_insert(&rest) {
                    Ok((id, username, email)) => match Row::new(id, username, email) {
                        Ok(row) => match tree.insert(id, &row)? {
                            InsertOutcome::Inserted => println!("Executed."),
                            InsertOutcome::DuplicateKey => println!("Key Already Exists."),
                        },
                        Err(Error::Syntax(msg)) => println!("{}", msg),
                        Err(e) => return Err(e),
                    },
                    Err(InsertParseError::Negative) => println!("ID can't be negative."),
                    Err(InsertParseError::Malformed) => {
                        println!("Syntax error. Could not parse statement.")
                    }
                }
            }
            Some("select") => {
                let mut cursor = tree.scan_start()?;
                while !cursor.end_of_table {
                    println!("{}", tree.read_row(&cursor)?);
                    tree.advance(&mut cursor)?;
                }
                println!("Executed.");
            }
            Some(_) => println!("Unrecognized command at the start {}", line),
            None => println!("Unrecognized command at the start {}", line),
        }
    }
}

enum InsertParseError {
    Negative,
    Malformed,
}

/// Parses the three whitespace-separated arguments to `insert`. `id` is checked for a
/// leading `-` before the unsigned parse, so a negative id is reported distinctly from a
/// merely malformed statement.
fn parse_insert(args: &[&str]) -> Result<(u32, &str, &str), InsertParseError> {
    let [id_str, username, email] = match args {
        [a, b, c] => [*a, *b, *c],
        _ => return Err(InsertParseError::Malformed),
    };
    if let Some(rest) = id_str.strip_prefix('-') {
        if rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty() {
            return Err(InsertParseError::Negative);
        }
        return Err(InsertParseError::Malformed);
    }
    let id: u32 = id_str.parse().map_err(|_| InsertParseError::Malformed)?;
    Ok((id, username, email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_insert_accepts_three_fields() {
        let (id, user, email) = parse_insert(&["1", "alice", "a@x"]).ok().unwrap();
        assert_eq!(id, 1);
        assert_eq!(user, "alice");
        assert_eq!(email, "a@x");
    }

    #[test]
    fn parse_insert_rejects_negative_id() {
        assert!(matches!(
            parse_insert(&["-7", "u", "e"]),
            Err(InsertParseError::Negative)
        ));
    }

    #[test]
    fn parse_insert_rejects_wrong_arity() {
        assert!(matches!(
            parse_insert(&["1", "alice"]),
            Err(InsertParseError::Malformed)
        ));
    }

    #[test]
    fn parse_insert_rejects_non_numeric_id() {
        assert!(matches!(
            parse_insert(&["abc", "alice", "a@x"]),
            Err(InsertParseError::Malformed)
        ));
    }
}
