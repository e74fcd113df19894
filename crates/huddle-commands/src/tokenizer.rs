//! Whitespace tokenizer with double-quote grouping.
//!
//! `"Fix login bug"` is one token. An unterminated quote runs to the end of
//! the input, since the user may still be typing.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) text: String,
    pub(crate) quoted: bool,
}

pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let text: String = chars.by_ref().take_while(|&c| c != '"').collect();
            tokens.push(Token { text, quoted: true });
            continue;
        }

        let mut text = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            text.push(c);
            chars.next();
        }
        tokens.push(Token { text, quoted: false });
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<(String, bool)> {
        tokenize(input).into_iter().map(|t| (t.text, t.quoted)).collect()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            texts("  Fix   bug\t@alice "),
            vec![
                ("Fix".to_owned(), false),
                ("bug".to_owned(), false),
                ("@alice".to_owned(), false)
            ]
        );
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            texts(r#""Fix login bug" @bob"#),
            vec![("Fix login bug".to_owned(), true), ("@bob".to_owned(), false)]
        );
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        assert_eq!(texts(r#"@bob "half typed"#), vec![
            ("@bob".to_owned(), false),
            ("half typed".to_owned(), true)
        ]);
    }
}
