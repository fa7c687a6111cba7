use crate::{ExtractError, Result};

/// A structural matcher over element class attributes.
///
/// Two forms are supported, mirroring the selectors hosts actually
/// configure: `.class-name` for an exact class and `[class*="fragment"]`
/// for a class-substring match. Anything else is rejected at parse time so
/// a bad config line fails loudly instead of silently matching nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Class(String),
    ClassContains(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(name) = raw.strip_prefix('.') {
            if !name.is_empty() && !name.contains(char::is_whitespace) {
                return Ok(Self::Class(name.to_string()));
            }
        }
        if let Some(body) = raw
            .strip_prefix("[class*=")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let fragment = body
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .or_else(|| {
                    body.strip_prefix('\'')
                        .and_then(|inner| inner.strip_suffix('\''))
                })
                .unwrap_or(body);
            if !fragment.is_empty() {
                return Ok(Self::ClassContains(fragment.to_string()));
            }
        }
        Err(ExtractError::InvalidSelector(raw.to_string()))
    }

    pub fn parse_list<S: AsRef<str>>(raws: &[S]) -> Result<Vec<Self>> {
        raws.iter().map(|raw| Self::parse(raw.as_ref())).collect()
    }

    /// Whether an element carrying `classes` satisfies this selector.
    #[must_use]
    pub fn matches_classes(&self, classes: &[String]) -> bool {
        match self {
            Self::Class(name) => classes.iter().any(|class| class == name),
            Self::ClassContains(fragment) => {
                classes.iter().any(|class| class.contains(fragment.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_class_selectors() {
        assert_eq!(
            Selector::parse(".forum-post").unwrap(),
            Selector::Class("forum-post".to_string())
        );
    }

    #[test]
    fn parses_class_contains_selectors() {
        assert_eq!(
            Selector::parse("[class*=\"message\"]").unwrap(),
            Selector::ClassContains("message".to_string())
        );
        assert_eq!(
            Selector::parse("[class*='post']").unwrap(),
            Selector::ClassContains("post".to_string())
        );
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(Selector::parse("div > span").is_err());
        assert!(Selector::parse(".").is_err());
        assert!(Selector::parse("[class*=\"\"]").is_err());
    }

    #[test]
    fn matches_exact_and_substring_classes() {
        let classes = vec!["forum-post".to_string(), "highlight".to_string()];
        assert!(Selector::Class("forum-post".to_string()).matches_classes(&classes));
        assert!(!Selector::Class("post".to_string()).matches_classes(&classes));
        assert!(Selector::ClassContains("post".to_string()).matches_classes(&classes));
        assert!(!Selector::ClassContains("comment".to_string()).matches_classes(&classes));
    }
}
