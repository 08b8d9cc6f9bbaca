//! Tokenizer for command-mode lines.
//!
//! A line typed after `Ctrl-A :` is split shell-style into a snippet name
//! and its arguments. The entry point is [`split_words`].

/// Errors from [`split_words`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("unclosed {0} quote")]
    UnclosedQuote(char),
    #[error("trailing backslash")]
    TrailingEscape,
}

/// Split `line` into words the way a POSIX shell would, without expansion.
///
/// Whitespace separates words. Single quotes preserve everything literally.
/// Double quotes preserve everything except `\"`, `\\`, `\$` and `` \` ``.
/// Outside quotes a backslash escapes the next character.
///
/// # Example
///
/// ```
/// use sertty::parser::split_words;
///
/// let words = split_words(r#"flash "my image.bin" --addr 0x8000"#).unwrap();
/// assert_eq!(words, ["flash", "my image.bin", "--addr", "0x8000"]);
/// ```
pub fn split_words(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut words = Vec::new();
    let mut word = String::new();
    // Distinguishes `""` (an empty word) from no word at all.
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\\' => {
                let next = chars.next().ok_or(TokenizeError::TrailingEscape)?;
                word.push(next);
                in_word = true;
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(TokenizeError::UnclosedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(TokenizeError::UnclosedQuote('"')),
                        },
                        Some(c) => word.push(c),
                        None => return Err(TokenizeError::UnclosedQuote('"')),
                    }
                }
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(word);
    }
    Ok(words)
}
