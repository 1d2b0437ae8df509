//! Expansion of bracket/pipe title syntax into the literal phrases it denotes.
//!
//! `LEFT [OUTER] JOIN` denotes `LEFT JOIN` and `LEFT OUTER JOIN`;
//! `UNION [ALL|DISTINCT]` denotes `UNION ALL` and `UNION DISTINCT`.
//! A lone `[X]` may be omitted, `[A|B]` picks exactly one alternative (an
//! empty alternative makes the group omissible).

use std::vec::IntoIter;

use itertools::Itertools;
use itertools::structs::MultiProduct;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Group(String),
}

impl Token {
    fn choices(self) -> Vec<String> {
        match self {
            Self::Word(word) => vec![word],
            Self::Group(inner) => {
                if inner.contains('|') {
                    inner
                        .split('|')
                        .map(|alternative| alternative.trim().to_string())
                        .collect()
                } else {
                    vec![String::new(), inner.trim().to_string()]
                }
            }
        }
    }
}

/// Lazy sequence of expanded phrases. Cloning the value restarts it.
#[derive(Debug, Clone)]
pub struct Expansion {
    product: Option<MultiProduct<IntoIter<String>>>,
}

impl Iterator for Expansion {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let combination = self.product.as_mut()?.next()?;
        Some(
            combination
                .iter()
                .filter(|part| !part.is_empty())
                .join(" "),
        )
    }
}

/// Expand `syntax` left to right, first-listed alternative first.
///
/// Duplicates are yielded as often as they arise; collapsing them is left to
/// the index uniqueness constraint.
pub fn expand(syntax: &str) -> Expansion {
    let choices = tokenize(syntax)
        .into_iter()
        .map(Token::choices)
        .collect::<Vec<_>>();
    let product = if choices.is_empty() {
        None
    } else {
        Some(
            choices
                .into_iter()
                .map(Vec::into_iter)
                .multi_cartesian_product(),
        )
    };
    Expansion { product }
}

/// True when `syntax` carries at least one closed bracket group.
pub fn has_groups(syntax: &str) -> bool {
    tokenize(syntax)
        .iter()
        .any(|token| matches!(token, Token::Group(_)))
}

fn tokenize(syntax: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = syntax.chars();

    while let Some(ch) = chars.next() {
        if ch.is_whitespace() {
            flush_word(&mut word, &mut tokens);
            continue;
        }
        if ch != '[' {
            word.push(ch);
            continue;
        }

        let mut inner = String::new();
        let mut depth = 1usize;
        for next in chars.by_ref() {
            match next {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            inner.push(next);
        }
        if depth == 0 && word.is_empty() {
            tokens.push(Token::Group(inner));
        } else {
            // unclosed, or attached to a word as in `ARRAY[OFFSET]`: literal
            word.push('[');
            word.push_str(&inner);
            if depth == 0 {
                word.push(']');
            }
        }
    }
    flush_word(&mut word, &mut tokens);
    tokens
}

fn flush_word(word: &mut String, tokens: &mut Vec<Token>) {
    if !word.is_empty() {
        tokens.push(Token::Word(std::mem::take(word)));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{expand, has_groups};

    fn collect(syntax: &str) -> Vec<String> {
        expand(syntax).collect()
    }

    #[test]
    fn alternation_yields_each_alternative_in_order() {
        assert_eq!(collect("[A|B] C"), vec!["A C", "B C"]);
        assert_eq!(
            collect("UNION [ALL|DISTINCT]"),
            vec!["UNION ALL", "UNION DISTINCT"]
        );
    }

    #[test]
    fn optional_group_yields_with_and_without() {
        let phrases = collect("A [B] C");
        assert_eq!(phrases.len(), 2);
        assert_eq!(
            phrases.into_iter().collect::<BTreeSet<_>>(),
            BTreeSet::from(["A B C".to_string(), "A C".to_string()])
        );
        assert_eq!(collect("[NOT] LIKE"), vec!["LIKE", "NOT LIKE"]);
    }

    #[test]
    fn plain_phrase_yields_itself_once() {
        assert_eq!(collect("CROSS JOIN"), vec!["CROSS JOIN"]);
        assert_eq!(collect("  SELECT   "), vec!["SELECT"]);
        assert!(collect("").is_empty());
    }

    #[test]
    fn product_covers_every_group() {
        assert_eq!(
            collect("[FULL|LEFT] [OUTER] JOIN"),
            vec!["FULL JOIN", "FULL OUTER JOIN", "LEFT JOIN", "LEFT OUTER JOIN"]
        );
        assert_eq!(
            collect("[|NATURAL] JOIN"),
            vec!["JOIN", "NATURAL JOIN"]
        );
    }

    #[test]
    fn duplicates_are_not_collapsed() {
        assert_eq!(collect("[A|A] B"), vec!["A B", "A B"]);
    }

    #[test]
    fn expansion_is_restartable() {
        let expansion = expand("X [Y] Z");
        let first: Vec<_> = expansion.clone().collect();
        let second: Vec<_> = expansion.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn brackets_inside_a_word_are_literal() {
        assert_eq!(collect("ARRAY[OFFSET]"), vec!["ARRAY[OFFSET]"]);
        assert_eq!(
            collect("ARRAY[SAFE_OFFSET] [NOT]"),
            vec!["ARRAY[SAFE_OFFSET]", "ARRAY[SAFE_OFFSET] NOT"]
        );
        assert!(!has_groups("ARRAY[OFFSET]"));
    }

    #[test]
    fn unclosed_group_is_literal() {
        assert_eq!(collect("ARRAY[ X"), vec!["ARRAY[ X"]);
        assert!(!has_groups("ARRAY[ X"));
        assert!(has_groups("COMMIT [TRANSACTION]"));
    }
}
