use crate::error::CompileError;

/// Split a command line into words the way a POSIX shell would, minus
/// expansion. Single quotes are literal, double quotes allow `\"` and `\\`,
/// and a bare backslash escapes the next character.
pub fn tokenize(raw: &str) -> Result<Vec<String>, CompileError> {
    let mut words = Vec::new();
    let mut word = String::new();
    // a word can exist and be empty, e.g. `''`
    let mut in_word = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(unterminated(raw, "single quote")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(unterminated(raw, "double quote")),
                        },
                        Some(c) => word.push(c),
                        None => return Err(unterminated(raw, "double quote")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => word.push(c),
                    None => {
                        return Err(CompileError::validation(
                            "container command",
                            raw,
                            "trailing backslash",
                        ))
                    }
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

fn unterminated(raw: &str, what: &str) -> CompileError {
    CompileError::validation("container command", raw, format!("unterminated {what}"))
}
