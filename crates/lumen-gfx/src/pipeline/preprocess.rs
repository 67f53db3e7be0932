use std::collections::HashMap;

use crate::error::{GfxError, GfxResult};

/// Line-oriented shader preprocessor.
///
/// Understands `#define NAME [VALUE]`, `#ifdef`, `#ifndef`, `#else` and
/// `#endif`, with nesting. Directive lines are removed from the output.
/// Defined values are recorded but never substituted into the source.
#[derive(Debug, Default)]
pub struct Preprocessor {
    defines: HashMap<String, Option<String>>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.defines.get(name).and_then(|v| v.as_deref())
    }

    /// Runs the preprocessor over `input`. Defines from earlier calls are discarded.
    pub fn process(&mut self, input: &str) -> GfxResult<String> {
        self.defines.clear();
        let mut output = String::with_capacity(input.len());
        let mut depth = 0usize;
        // Nest depth of the innermost conditional whose branch is skipped; 0 = emitting.
        let mut ignore = 0usize;

        for (n, line) in input.lines().enumerate() {
            let line_no = n + 1;
            let trimmed = line.trim();
            let mut words = trimmed.split_whitespace();
            let directive = if trimmed.starts_with('#') { words.next() } else { None };

            match directive {
                Some(d @ ("#ifdef" | "#ifndef")) => {
                    depth += 1;
                    if ignore == 0 {
                        let name = directive_name(words.next(), d, line_no)?;
                        if self.is_defined(name) != (d == "#ifdef") {
                            ignore = depth;
                        }
                    }
                }
                Some("#else") => {
                    if depth == 0 {
                        return Err(unbalanced("#else", line_no));
                    }
                    if ignore == depth {
                        ignore = 0;
                    } else if ignore == 0 {
                        ignore = depth;
                    }
                }
                Some("#endif") => {
                    if depth == 0 {
                        return Err(unbalanced("#endif", line_no));
                    }
                    if ignore == depth {
                        ignore = 0;
                    }
                    depth -= 1;
                }
                Some("#define") if ignore == 0 => {
                    let name = directive_name(words.next(), "#define", line_no)?;
                    let value = words.next().map(str::to_owned);
                    self.defines.insert(name.to_owned(), value);
                }
                _ if ignore == 0 => {
                    output.push_str(line);
                    output.push('\n');
                }
                _ => {}
            }
        }

        if depth != 0 {
            return Err(GfxError::validation(format!("{depth} unterminated #ifdef/#ifndef block(s)")));
        }
        Ok(output)
    }
}

fn directive_name<'a>(word: Option<&'a str>, directive: &str, line: usize) -> GfxResult<&'a str> {
    word.ok_or_else(|| GfxError::validation(format!("line {line}: {directive} without a name")))
}

fn unbalanced(directive: &str, line: usize) -> GfxError {
    GfxError::validation(format!("line {line}: {directive} without a matching #ifdef"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_conditionals_in_skipped_branches_are_ignored() {
        let src = "abcd\n#define A\n#define B 456\n\
                   #ifdef A\nyes1\n\
                   #ifdef B\nyes2\n#else\nno\n#endif\nyes3\n\
                   #else\nno, inside main else\n\
                   #ifdef B\nno\n#else\nno\n#endif\nno\n\
                   #endif\nyes4\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert_eq!(out, "abcd\nyes1\nyes2\nyes3\nyes4\n");
        assert_eq!(pp.value("B"), Some("456"));
        assert!(pp.is_defined("A"));
    }

    #[test]
    fn ifndef_and_defines_inside_skipped_blocks() {
        let src = "#ifndef X\n#define Y\nkept\n#else\n#define Z\n#endif\n#ifdef Z\ndropped\n#endif\n";
        let mut pp = Preprocessor::new();
        assert_eq!(pp.process(src).unwrap(), "kept\n");
        assert!(pp.is_defined("Y"));
        assert!(!pp.is_defined("Z"));
    }

    #[test]
    fn unbalanced_directives_are_errors() {
        let mut pp = Preprocessor::new();
        assert!(pp.process("#endif\n").is_err());
        assert!(pp.process("#ifdef A\nx\n").is_err());
        assert!(pp.process("#define\n").is_err());
    }
}
