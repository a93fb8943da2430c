//! Submission-code extraction from document names and the stage-01 rename.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::SubmissionCode;

// `{year}/{month} {CODE}{company} - {original}` as written by the rename
static RE_RENAMED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{2,4}/\d{1,2} ([A-Z]{2})\S*(?: \S+)*? - ").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    #[error("no submission code in '{name}'")]
    NotFound { name: String },

    #[error("'{name}' carries more than one submission code ({})", join_codes(.codes))]
    Ambiguous {
        name: String,
        codes: Vec<SubmissionCode>,
    },
}

fn join_codes(codes: &[SubmissionCode]) -> String {
    codes
        .iter()
        .map(SubmissionCode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves the submission code carried by a document name.
///
/// Names produced by the initial-stage rename have the full shape
/// `{year}/{month} {CODE}{company} - {original}`; the code in that prefix is
/// authoritative. Any other name, including one that merely starts with a
/// date, is scanned for whole-word codes and must contain exactly one
/// distinct code.
#[derive(Debug, Clone)]
pub struct CodeParser {
    alphabet: Vec<SubmissionCode>,
}

impl CodeParser {
    pub fn new(alphabet: &[SubmissionCode]) -> Self {
        Self {
            alphabet: alphabet.to_vec(),
        }
    }

    pub fn parse(&self, name: &str) -> Result<SubmissionCode, CodeError> {
        if let Some(code) = self.dated_prefix(name) {
            return Ok(code);
        }

        let found: BTreeSet<SubmissionCode> = name
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter_map(|word| self.known(word))
            .collect();

        let mut codes = found.into_iter();
        match (codes.next(), codes.next()) {
            (Some(code), None) => Ok(code),
            (None, _) => Err(CodeError::NotFound {
                name: name.to_string(),
            }),
            (Some(first), Some(second)) => Err(CodeError::Ambiguous {
                name: name.to_string(),
                codes: [first, second].into_iter().chain(codes).collect(),
            }),
        }
    }

    fn dated_prefix(&self, name: &str) -> Option<SubmissionCode> {
        let captures = RE_RENAMED.captures(name)?;
        self.known(captures.get(1)?.as_str())
    }

    fn known(&self, word: &str) -> Option<SubmissionCode> {
        let code = word.parse::<SubmissionCode>().ok()?;
        self.alphabet.contains(&code).then_some(code)
    }
}

/// Name given to a document when it leaves the initial stage.
pub fn initial_stage_name(
    year: &str,
    month: &str,
    code: SubmissionCode,
    company: &str,
    original: &str,
) -> String {
    format!("{}/{} {}{} - {}", year, month, code, company, original)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CodeParser {
        CodeParser::new(&SubmissionCode::ALL)
    }

    #[test]
    fn test_initial_stage_name_format() {
        let name = initial_stage_name("2024", "08", SubmissionCode::Sr, "ACME", "repair.pdf");
        assert_eq!(name, "2024/08 SRACME - repair.pdf");
    }

    #[test]
    fn test_dated_prefix_is_authoritative() {
        let cases = [
            ("2024/08 SRACME - repair.pdf", SubmissionCode::Sr),
            ("24/8 GPPT Sinar - MR notes.pdf", SubmissionCode::Gp),
            ("  2024/12 MP - form.pdf", SubmissionCode::Mp),
        ];
        for (name, expected) in cases {
            assert_eq!(parser().parse(name).unwrap(), expected, "name: {}", name);
        }
    }

    #[test]
    fn test_whole_word_scan() {
        let cases = [
            ("SR repair.pdf", SubmissionCode::Sr),
            ("repair-GP.pdf", SubmissionCode::Gp),
            ("form-sp v2.pdf", SubmissionCode::Sp),
            ("Form (MR) SR.pdf", SubmissionCode::Mr),
        ];
        for (name, expected) in cases.iter().take(3) {
            assert_eq!(parser().parse(name).unwrap(), *expected, "name: {}", name);
        }
        // Two distinct codes outside a dated prefix
        assert!(matches!(
            parser().parse(cases[3].0),
            Err(CodeError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_codes_inside_words_do_not_count() {
        assert_eq!(
            parser().parse("DESCRIPTION SPRING.pdf"),
            Err(CodeError::NotFound {
                name: "DESCRIPTION SPRING.pdf".to_string()
            })
        );
        assert!(parser().parse("GPS tracker.pdf").is_err());
    }

    #[test]
    fn test_repeated_code_is_not_ambiguous() {
        assert_eq!(parser().parse("SR copy of SR.pdf").unwrap(), SubmissionCode::Sr);
    }

    #[test]
    fn test_ambiguous_lists_codes() {
        let err = parser().parse("MR or GR.pdf").unwrap_err();
        assert_eq!(
            err,
            CodeError::Ambiguous {
                name: "MR or GR.pdf".to_string(),
                codes: vec![SubmissionCode::Mr, SubmissionCode::Gr],
            }
        );
        assert!(err.to_string().contains("MR, GR"));
    }

    #[test]
    fn test_restricted_alphabet() {
        let parser = CodeParser::new(&[SubmissionCode::Sr]);
        assert!(parser.parse("2024/08 GPACME - x.pdf").is_err());
        assert_eq!(parser.parse("SR and GP.pdf").unwrap(), SubmissionCode::Sr);
    }

    #[test]
    fn test_malformed_dates_fall_back_to_scan() {
        // Five-digit year is not a dated prefix and SRACME is not a whole word
        assert_eq!(
            parser().parse("20245/08 SRACME.pdf").unwrap_err(),
            CodeError::NotFound {
                name: "20245/08 SRACME.pdf".to_string()
            }
        );
        assert_eq!(parser().parse("2024-08 SR x.pdf").unwrap(), SubmissionCode::Sr);
    }

    #[test]
    fn test_date_without_rename_shape_is_scanned() {
        let cases = [
            "2024/08 Spring inspection.pdf",
            "24/8 Grease change.pdf",
            "2024/08 SRACME repair.pdf",
            "24/8 spPT Sinar - notes.pdf",
        ];
        for name in cases {
            assert_eq!(
                parser().parse(name),
                Err(CodeError::NotFound {
                    name: name.to_string()
                }),
                "name: {}",
                name
            );
        }
        // A whole-word code after a bare date still counts
        assert_eq!(parser().parse("2024/08 MP quote.pdf").unwrap(), SubmissionCode::Mp);
    }
}
