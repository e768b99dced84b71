#![forbid(unsafe_code)]

//! `stdio-dictionary-demo`: a reference backend for the stdio protocol.
//!
//! Serves a small fixed dictionary. Environment variables select the
//! handshake and how the backend misbehaves:
//!
//! | Variable          | Effect                                                  |
//! |-------------------|---------------------------------------------------------|
//! | `DEMO_HANDSHAKE`  | raw first stdout line                                   |
//! | `DEMO_MODE`       | `normal`, `silent`, `exit`, `reverse`, `stderr`, `garbage` |
//! | `DEMO_EXIT_AFTER` | requests read before exiting in `exit` mode (default 1) |

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

const DEFAULT_HANDSHAKE: &str = r#"{"longest-key":4,"max-latency-ms":null,"untranslate":true}"#;

/// Exit code used by `exit` mode.
const EXIT_CODE: i32 = 3;

const ENTRIES: &[(&[&str], &str)] = &[
    (&["T", "E", "F", "T"], "test"),
    (&["TEFT"], "test"),
    (&["H-L"], "hello"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Silent,
    Exit,
    Reverse,
    Stderr,
    Garbage,
}

impl Mode {
    fn from_env() -> Self {
        match std::env::var("DEMO_MODE").as_deref() {
            Ok("silent") => Self::Silent,
            Ok("exit") => Self::Exit,
            Ok("reverse") => Self::Reverse,
            Ok("stderr") => Self::Stderr,
            Ok("garbage") => Self::Garbage,
            _ => Self::Normal,
        }
    }
}

fn main() -> io::Result<()> {
    let mode = Mode::from_env();
    let exit_after: usize = std::env::var("DEMO_EXIT_AFTER")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(1);
    let handshake = std::env::var("DEMO_HANDSHAKE").unwrap_or_else(|_| DEFAULT_HANDSHAKE.into());

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{handshake}")?;
    stdout.flush()?;

    let mut received = 0usize;
    let mut held: Vec<Value> = Vec::new();

    for line in io::stdin().lock().lines() {
        let line = line?;
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            eprintln!("unreadable request: {line}");
            continue;
        };
        received += 1;

        match mode {
            Mode::Silent => {}
            Mode::Exit => {
                if received >= exit_after {
                    std::process::exit(EXIT_CODE);
                }
            }
            Mode::Reverse => {
                held.push(answer(&request));
                if held.len() == 2 {
                    while let Some(response) = held.pop() {
                        writeln!(stdout, "{response}")?;
                    }
                    stdout.flush()?;
                }
            }
            Mode::Stderr => {
                let seq = request.get("seq").cloned().unwrap_or(Value::Null);
                eprintln!("diagnostic {seq}");
                writeln!(stdout, "{}", answer(&request))?;
                stdout.flush()?;
            }
            Mode::Garbage => {
                writeln!(stdout, "this is not json")?;
                writeln!(stdout, "{}", answer(&request))?;
                stdout.flush()?;
            }
            Mode::Normal => {
                writeln!(stdout, "{}", answer(&request))?;
                stdout.flush()?;
            }
        }
    }

    Ok(())
}

fn answer(request: &Value) -> Value {
    let seq = request.get("seq").cloned().unwrap_or(Value::Null);

    if let Some(strokes) = request.get("translate").and_then(Value::as_array) {
        let strokes: Vec<&str> = strokes.iter().filter_map(Value::as_str).collect();
        return match ENTRIES.iter().find(|(key, _)| *key == strokes.as_slice()) {
            Some((_, text)) => json!({ "seq": seq, "translation": text }),
            None => json!({ "seq": seq }),
        };
    }

    if let Some(text) = request.get("untranslate").and_then(Value::as_str) {
        let outlines: Vec<&[&str]> = ENTRIES
            .iter()
            .filter(|(_, value)| *value == text)
            .map(|(key, _)| *key)
            .collect();
        return json!({ "seq": seq, "reverse-translation": outlines });
    }

    eprintln!("unknown request: {request}");
    json!({ "seq": seq })
}
