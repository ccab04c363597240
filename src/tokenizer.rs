//! Argument tokenizer: splits one flat string into an ordered token list and
//! a named flag map. Ported from the character-scanning state
//! machine in `ar.ParseArg` — same states (`inarg`/`inqstr`/`inflag`), same
//! quote-escape rule (`\` right before the matching quote keeps it literal,
//! any other quote character inside is literal), same positional-argument
//! naming (`#0`, `#1`, ...).
//!
//! ```
//! let (tokens, flags) = q::tokenizer::parse(
//!     r#"1234 -22.6 5678,334 $58.99 -555 58% -333.22 (77) TT[99] map(66) {curl} possable values here"#
//! ).unwrap();
//! assert_eq!(tokens[0], "1234");
//! assert_eq!(tokens[1], "-22.6");
//! assert_eq!(flags.get("22.6").map(String::as_str), Some("5678,334"));
//! assert_eq!(flags.get("#0").map(String::as_str), Some("1234"));
//! ```

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("single-character flag name is not valid")]
    SingleCharFlag,
}

/// `-`/`+`/`!`-prefixed tokens are flag names; `+name`/`!name` are shorthand
/// for `name=true`/`name=false`. Everything else — including a flag's value
/// token and unprefixed positionals — is an ordinary argument.
fn is_flag_start(c: char) -> bool {
    matches!(c, '-' | '+' | '!')
}

struct Parser {
    tokens: Vec<String>,
    flags: HashMap<String, String>,
    positional_count: usize,
}

impl Parser {
    fn new() -> Self {
        Self { tokens: Vec::new(), flags: HashMap::new(), positional_count: 0 }
    }

    /// Records `flag`/`value` into the map, stripping leading `-`/`--`/`+`/`!`
    /// and splitting an embedded `flagname=value` at the first `=`. An empty
    /// flag name means a bare positional argument, keyed `#N` in encounter
    /// order; `--` alone is kept literal the same way.
    fn emit_flag(&mut self, flag: &str, value: &str) -> Result<(), TokenizeError> {
        if flag.is_empty() || flag == "--" {
            self.flags.insert(format!("#{}", self.positional_count), value.to_string());
            return Ok(());
        }
        if flag.len() < 2 {
            return Err(TokenizeError::SingleCharFlag);
        }
        let mut name = &flag[1..];
        if let Some(rest) = name.strip_prefix('-') {
            name = rest;
        }
        if name.is_empty() {
            return Err(TokenizeError::SingleCharFlag);
        }
        let shorthand_true = flag.starts_with('+');
        let shorthand_false = flag.starts_with('!');
        if let Some((key, val)) = name.split_once('=') {
            self.flags.insert(key.to_string(), val.to_string());
        } else if shorthand_true {
            self.flags.insert(name.to_string(), "true".to_string());
        } else if shorthand_false {
            self.flags.insert(name.to_string(), "false".to_string());
        } else {
            self.flags.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    fn emit_arg(&mut self, flag: &str, arg: &str) -> Result<(), TokenizeError> {
        self.tokens.push(arg.to_string());
        if !flag.contains('=') {
            self.emit_flag(flag, arg)?;
        }
        self.positional_count += 1;
        Ok(())
    }
}

/// Parses `input` into an `(ordered tokens, named flag map)` pair.
pub fn parse(input: &str) -> Result<(Vec<String>, HashMap<String, String>), TokenizeError> {
    let mut p = Parser::new();
    let chars: Vec<char> = input.chars().collect();

    let mut arg = String::new();
    let mut flag = String::new();
    let mut in_arg = false;
    let mut in_qstr = false;
    let mut in_flag = false;
    let mut quote_char = '\0';
    let mut last_c = '\0';

    for &c in &chars {
        if c == ' ' {
            if in_arg {
                p.emit_arg(&flag, &arg)?;
                arg.clear();
                flag.clear();
                in_arg = false;
                in_flag = false;
            } else if in_qstr {
                arg.push(c);
            } else if in_flag {
                p.tokens.push(flag.clone());
                p.positional_count += 1;
                in_flag = false;
            }
        } else if is_flag_start(c) {
            if in_arg || in_qstr {
                arg.push(c);
            } else if in_flag {
                flag.push(c);
            } else {
                if !flag.is_empty() {
                    p.emit_flag(&flag, "")?;
                }
                in_flag = true;
                flag = c.to_string();
            }
        } else if c == '"' || c == '\'' {
            if in_qstr {
                if c == quote_char && last_c != '\\' {
                    p.emit_arg(&flag, &arg)?;
                    arg.clear();
                    flag.clear();
                    in_arg = false;
                    in_flag = false;
                    in_qstr = false;
                    quote_char = '\0';
                } else {
                    arg.push(c);
                }
            } else {
                quote_char = c;
                in_qstr = true;
            }
        } else if in_flag {
            flag.push(c);
        } else if in_qstr {
            arg.push(c);
        } else {
            in_arg = true;
            arg.push(c);
        }
        last_c = c;
    }

    if in_arg {
        p.emit_arg(&flag, &arg)?;
    } else if in_flag {
        p.tokens.push(flag.clone());
        p.emit_flag(&flag, &arg)?;
    }

    Ok((p.tokens, p.flags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_and_named_flags() {
        let (tokens, flags) = parse("-in the --cap 'Library, or watch-devil \"in the details\"' -hyp \"molly-coddle\" -the  video --fox 55 -stage 'Tutorial.'").unwrap();
        assert_eq!(tokens[0], "-in");
        assert_eq!(tokens[1], "the");
        assert_eq!(flags.get("hyp").map(String::as_str), Some("molly-coddle"));
        assert_eq!(flags.get("fox").map(String::as_str), Some("55"));
        assert_eq!(flags.get("stage").map(String::as_str), Some("Tutorial."));
    }

    #[test]
    fn leading_digit_after_dash_is_a_flag_name() {
        let (tokens, flags) = parse("1234 -22.6 5678,334").unwrap();
        assert_eq!(tokens, vec!["1234", "-22.6", "5678,334"]);
        assert_eq!(flags.get("22.6").map(String::as_str), Some("5678,334"));
        assert_eq!(flags.get("#0").map(String::as_str), Some("1234"));
    }

    #[test]
    fn plus_and_bang_shorthand() {
        let (_, flags) = parse("+upcase !quiet").unwrap();
        assert_eq!(flags.get("upcase").map(String::as_str), Some("true"));
        assert_eq!(flags.get("quiet").map(String::as_str), Some("false"));
    }

    #[test]
    fn embedded_equals_splits_without_consuming_next_token() {
        let (_, flags) = parse("-hamer=false --revenge=true").unwrap();
        assert_eq!(flags.get("hamer").map(String::as_str), Some("false"));
        assert_eq!(flags.get("revenge").map(String::as_str), Some("true"));
    }

    #[test]
    fn double_dash_alone_starts_positionals() {
        let (tokens, flags) = parse("-quiet -- gparm -right 88").unwrap();
        assert!(tokens.contains(&"--".to_string()));
        assert_eq!(flags.get("right").map(String::as_str), Some("88"));
    }

    #[test]
    fn bare_single_dash_at_end_of_input_is_an_error() {
        assert_eq!(parse("-"), Err(TokenizeError::SingleCharFlag));
    }

    #[test]
    fn quoted_spans_preserve_whitespace() {
        let (tokens, _) = parse(r#"-keep 'red green white gray'"#).unwrap();
        assert_eq!(tokens[1], "red green white gray");
    }
}
