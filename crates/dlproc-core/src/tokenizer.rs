//! Property file tokenizer.
//!
//! A property file is a line-oriented list of steps:
//!
//! ```text
//! STEP_1_SQLQUERY
//! SELECT * FROM raw.sales
//! STEP_1_TEMPTABLE
//! sales_v
//! STEP_2_TGTQUERY
//! INSERT INTO mart.sales SELECT * FROM sales_v
//! END
//! ```
//!
//! `_SQLQUERY` opens a query that becomes a view at the matching
//! `_TEMPTABLE` marker, whose single following line is the view name.
//! `_TGTQUERY` collects lines up to the next `STEP_` line or `END`.

use crate::error::DlprocError;
use crate::step::StepToken;

const STEP_PREFIX: &str = "STEP_";
const SQL_QUERY_SUFFIX: &str = "_SQLQUERY";
const TEMP_TABLE_SUFFIX: &str = "_TEMPTABLE";
const TARGET_QUERY_SUFFIX: &str = "_TGTQUERY";
const END_MARKER: &str = "END";

/// Forward-only cursor over the trimmed lines of a property file.
#[derive(Debug)]
pub struct LineCursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().map(str::trim).collect(),
            pos: 0,
        }
    }

    /// Next line without consuming it.
    pub fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    /// Consume and return the next line.
    pub fn advance(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    /// 1-based number of the last consumed line (0 before the first advance).
    pub fn line_number(&self) -> usize {
        self.pos
    }
}

/// Identifier between the first and second `_` of a marker line.
pub fn step_id_from_marker(line: &str) -> &str {
    line.split('_').nth(1).unwrap_or_default()
}

fn is_marker(line: &str, suffix: &str) -> bool {
    line.starts_with(STEP_PREFIX) && line.ends_with(suffix)
}

fn append_line(query: &mut String, line: &str) {
    query.push_str(line);
    query.push(' ');
}

#[derive(Debug)]
struct PendingView {
    step_id: String,
    query: String,
}

/// Lazy step tokenizer.
///
/// Yields tokens in file order and stops after `END`, end of input, or the
/// first error.
#[derive(Debug)]
pub struct StepTokenizer<'a> {
    cursor: LineCursor<'a>,
    pending: Option<PendingView>,
    done: bool,
}

impl<'a> StepTokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            cursor: LineCursor::new(text),
            pending: None,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        if let Some(pending) = self.pending.take() {
            tracing::warn!(
                step_id = %pending.step_id,
                "SQL query has no view or target marker, step dropped"
            );
        }
    }

    fn view_token(&mut self, marker: &str) -> Result<Option<StepToken>, DlprocError> {
        let marker_line = self.cursor.line_number();
        let view_name = self.cursor.advance().ok_or_else(|| DlprocError::TruncatedInput {
            marker: marker.to_string(),
            line: marker_line,
        })?;

        match self.pending.take() {
            Some(pending) if !pending.query.is_empty() => Ok(Some(StepToken::create_view(
                pending.step_id,
                pending.query,
                view_name,
            ))),
            _ => {
                tracing::debug!(marker, view_name, "View marker without a query, ignored");
                Ok(None)
            }
        }
    }

    fn target_token(&mut self, marker: &str) -> StepToken {
        if let Some(pending) = self.pending.take() {
            tracing::warn!(
                step_id = %pending.step_id,
                "SQL query superseded by a target query, step dropped"
            );
        }

        let mut query = String::new();
        while let Some(line) = self.cursor.peek() {
            if line.starts_with(STEP_PREFIX) || line == END_MARKER {
                break;
            }
            append_line(&mut query, line);
            self.cursor.advance();
        }

        StepToken::target_mutation(step_id_from_marker(marker), query)
    }
}

impl Iterator for StepTokenizer<'_> {
    type Item = Result<StepToken, DlprocError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(line) = self.cursor.advance() else {
                self.finish();
                break;
            };

            if is_marker(line, SQL_QUERY_SUFFIX) {
                self.pending = Some(PendingView {
                    step_id: step_id_from_marker(line).to_string(),
                    query: String::new(),
                });
            } else if is_marker(line, TEMP_TABLE_SUFFIX) {
                match self.view_token(line) {
                    Ok(Some(token)) => return Some(Ok(token)),
                    Ok(None) => {}
                    Err(e) => {
                        self.finish();
                        return Some(Err(e));
                    }
                }
            } else if is_marker(line, TARGET_QUERY_SUFFIX) {
                return Some(Ok(self.target_token(line)));
            } else if line == END_MARKER {
                self.finish();
            } else if let Some(pending) = self.pending.as_mut() {
                append_line(&mut pending.query, line);
            }
        }
        None
    }
}

impl std::iter::FusedIterator for StepTokenizer<'_> {}

/// Tokenize a whole property file eagerly.
pub fn tokenize(text: &str) -> Result<Vec<StepToken>, DlprocError> {
    StepTokenizer::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    #[test]
    fn test_cursor_peek_and_advance() {
        let mut cursor = LineCursor::new("  a  \nb\n");
        assert_eq!(cursor.line_number(), 0);
        assert_eq!(cursor.peek(), Some("a"));
        assert_eq!(cursor.advance(), Some("a"));
        assert_eq!(cursor.line_number(), 1);
        assert_eq!(cursor.peek(), Some("b"));
        assert_eq!(cursor.advance(), Some("b"));
        assert_eq!(cursor.peek(), None);
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.line_number(), 2);
    }

    #[test]
    fn test_step_id_from_marker() {
        assert_eq!(step_id_from_marker("STEP_1_SQLQUERY"), "1");
        assert_eq!(step_id_from_marker("STEP_load_TGTQUERY"), "load");
        assert_eq!(step_id_from_marker("STEP"), "");
    }

    #[test]
    fn test_view_name_binding() {
        let tokens = tokenize("STEP_1_SQLQUERY\nSELECT 1\nSTEP_1_TEMPTABLE\nv1\nEND").unwrap();
        assert_eq!(tokens, vec![StepToken::create_view("1", "SELECT 1 ", "v1")]);
    }

    #[test]
    fn test_target_query_accumulation() {
        let tokens =
            tokenize("STEP_2_TGTQUERY\nINSERT INTO t\nSELECT * FROM v1\nEND").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, StepKind::TargetMutation);
        assert_eq!(tokens[0].step_id, "2");
        assert_eq!(tokens[0].query_text, "INSERT INTO t SELECT * FROM v1 ");
        assert_eq!(tokens[0].view_name, None);
    }

    #[test]
    fn test_full_flow_preserves_file_order() {
        let text = "\
STEP_1_SQLQUERY
SELECT id,
  amount
FROM raw.sales
STEP_1_TEMPTABLE
sales_v
STEP_2_SQLQUERY
SELECT * FROM sales_v WHERE amount > 0
STEP_2_TEMPTABLE
positive_v
STEP_3_TGTQUERY
INSERT INTO mart.sales
SELECT * FROM positive_v
STEP_4_TGTQUERY
DELETE FROM staging.sales
END
STEP_5_TGTQUERY
DROP TABLE mart.sales
";
        let tokens = tokenize(text).unwrap();
        let ids: Vec<&str> = tokens.iter().map(|t| t.step_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(tokens[0].query_text, "SELECT id, amount FROM raw.sales ");
        assert_eq!(tokens[1].view_name.as_deref(), Some("positive_v"));
        assert_eq!(tokens[2].query_text, "INSERT INTO mart.sales SELECT * FROM positive_v ");
        assert_eq!(tokens[3].query_text, "DELETE FROM staging.sales ");
    }

    #[test]
    fn test_unmatched_sql_query_is_dropped() {
        let tokens = tokenize("STEP_1_SQLQUERY\nSELECT 1\nEND").unwrap();
        assert!(tokens.is_empty());

        let tokens = tokenize("STEP_1_SQLQUERY\nSELECT 1\n").unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_sql_query_superseded_by_target_query() {
        let tokens = tokenize("STEP_1_SQLQUERY\nSELECT 1\nSTEP_2_TGTQUERY\nDELETE FROM t\nEND")
            .unwrap();
        assert_eq!(tokens, vec![StepToken::target_mutation("2", "DELETE FROM t ")]);
    }

    #[test]
    fn test_temp_table_at_end_of_input_is_truncated() {
        let mut tokenizer = StepTokenizer::new("STEP_1_SQLQUERY\nSELECT 1\nSTEP_1_TEMPTABLE");
        let err = tokenizer.next().unwrap().unwrap_err();
        match err {
            DlprocError::TruncatedInput { marker, line } => {
                assert_eq!(marker, "STEP_1_TEMPTABLE");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(tokenizer.next().is_none());
    }

    #[test]
    fn test_tokens_before_truncation_are_yielded() {
        let text = "STEP_1_TGTQUERY\nDELETE FROM t\nSTEP_2_SQLQUERY\nSELECT 2\nSTEP_2_TEMPTABLE";
        let mut tokenizer = StepTokenizer::new(text);
        assert_eq!(
            tokenizer.next().unwrap().unwrap(),
            StepToken::target_mutation("1", "DELETE FROM t ")
        );
        assert!(tokenizer.next().unwrap().is_err());
        assert!(tokenizer.next().is_none());
    }

    #[test]
    fn test_empty_sql_query_yields_no_view() {
        let tokens = tokenize("STEP_1_SQLQUERY\nSTEP_1_TEMPTABLE\nv1\nEND").unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_temp_table_without_query_consumes_view_name() {
        let tokens = tokenize("STEP_1_TEMPTABLE\nSTEP_2_TGTQUERY\nSELECT 1\nEND").unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_lines_outside_steps_are_ignored() {
        let tokens = tokenize("# nightly load\n\nowner: etl\nSTEP_1_TGTQUERY\nSELECT 1\n").unwrap();
        assert_eq!(tokens, vec![StepToken::target_mutation("1", "SELECT 1 ")]);
    }

    #[test]
    fn test_whitespace_around_lines_is_insignificant() {
        let tokens =
            tokenize("  STEP_1_SQLQUERY  \n\tSELECT 1\t\n STEP_1_TEMPTABLE\n  v1  \n END ").unwrap();
        assert_eq!(tokens, vec![StepToken::create_view("1", "SELECT 1 ", "v1")]);
    }

    #[test]
    fn test_end_stops_tokenization() {
        let tokens = tokenize("END\nSTEP_1_TGTQUERY\nSELECT 1\n").unwrap();
        assert!(tokens.is_empty());
    }
}
