//! Parser for the line-oriented command protocol.
//!
//! ```text
//! ping ;
//! status ;
//! topology ;
//! select [with taints ["t1", ...]] [with datasets ["ds", ...]]
//!        [into iterator] <query> ;
//! iterator "<id>" pop <n> ;
//! index "/path" ["/path2" ...] [with [gram3, text4]]
//!       [with taints ["t1"]] [nocheck] ;
//! index from list "/file" [with [...]] [with taints [...]] [nocheck] ;
//! reindex "<dataset>" ;
//! compact all|smart ;
//! config get ["key" ...] ;
//! config set "key" <value> ;
//! dataset "<id>" taint "tag" ;
//! dataset "<id>" untaint "tag" ;
//! dataset "<id>" drop ;
//! ```
//!
//! The trailing `;` is accepted but not required. The `select` query
//! expression is everything after the clauses, handed to
//! [`scour_query::parse_query`].

use std::collections::BTreeSet;

use scour_query::parse_query;
use scour_types::{DatasetId, IndexKind, IteratorId};

use crate::command::{Command, CompactKind, TaintMode};
use crate::error::{CommandError, CommandResult};

/// Parses one request line into a [`Command`].
pub fn parse_command(input: &str) -> CommandResult<Command> {
    let mut cursor = Cursor::new(input);

    let Some(head) = cursor.next_word() else {
        return Err(CommandError::Parse("empty command".to_string()));
    };

    match head {
        "ping" => {
            cursor.expect_end()?;
            Ok(Command::Ping)
        }
        "status" => {
            cursor.expect_end()?;
            Ok(Command::Status)
        }
        "topology" => {
            cursor.expect_end()?;
            Ok(Command::Topology)
        }
        "select" => parse_select(&mut cursor),
        "iterator" => parse_iterator_pop(&mut cursor),
        "index" => parse_index(&mut cursor),
        "reindex" => {
            let dataset = DatasetId::new(cursor.parse_quoted()?);
            cursor.expect_end()?;
            Ok(Command::Reindex { dataset })
        }
        "compact" => {
            let kind = match cursor.next_word() {
                Some("all") => CompactKind::All,
                Some("smart") => CompactKind::Smart,
                other => {
                    return Err(CommandError::Parse(format!(
                        "expected all or smart after compact, got {other:?}"
                    )))
                }
            };
            cursor.expect_end()?;
            Ok(Command::Compact { kind })
        }
        "config" => parse_config(&mut cursor),
        "dataset" => parse_dataset(&mut cursor),
        other => Err(CommandError::Parse(format!("unknown command {other:?}"))),
    }
}

fn parse_select(cursor: &mut Cursor) -> CommandResult<Command> {
    let mut taints = Vec::new();
    let mut datasets = Vec::new();
    let mut iterator = false;

    loop {
        if cursor.eat_word("with") {
            if cursor.eat_word("taints") {
                taints = cursor.parse_string_list()?;
            } else if cursor.eat_word("datasets") {
                datasets = cursor
                    .parse_string_list()?
                    .into_iter()
                    .map(DatasetId::new)
                    .collect();
            } else {
                return Err(CommandError::Parse(
                    "expected taints or datasets after with".to_string(),
                ));
            }
        } else if cursor.eat_word("into") {
            if !cursor.eat_word("iterator") {
                return Err(CommandError::Parse(
                    "expected iterator after into".to_string(),
                ));
            }
            iterator = true;
        } else {
            break;
        }
    }

    let query_text = cursor.rest_until_terminator();
    if query_text.is_empty() {
        return Err(CommandError::Parse("select needs a query".to_string()));
    }
    let query = parse_query(query_text)?;

    Ok(Command::Select {
        query,
        taints,
        datasets,
        iterator,
    })
}

fn parse_iterator_pop(cursor: &mut Cursor) -> CommandResult<Command> {
    let iterator = IteratorId::new(cursor.parse_quoted()?);
    if !cursor.eat_word("pop") {
        return Err(CommandError::Parse(
            "expected pop after iterator id".to_string(),
        ));
    }
    let count = cursor.parse_number()?;
    cursor.expect_end()?;
    Ok(Command::IteratorPop { iterator, count })
}

fn parse_index(cursor: &mut Cursor) -> CommandResult<Command> {
    let mut list_path = None;
    let mut paths = Vec::new();

    if cursor.eat_word("from") {
        if !cursor.eat_word("list") {
            return Err(CommandError::Parse("expected list after from".to_string()));
        }
        list_path = Some(cursor.parse_quoted()?);
    } else {
        while cursor.peeks_quote() {
            paths.push(cursor.parse_quoted()?);
        }
        if paths.is_empty() {
            return Err(CommandError::Parse(
                "index needs at least one path".to_string(),
            ));
        }
    }

    let mut kinds = Vec::new();
    let mut taints = BTreeSet::new();
    let mut ensure_unique = true;

    loop {
        if cursor.eat_word("with") {
            if cursor.eat_word("taints") {
                taints = cursor.parse_string_list()?.into_iter().collect();
            } else {
                kinds = cursor.parse_kind_list()?;
            }
        } else if cursor.eat_word("nocheck") {
            ensure_unique = false;
        } else {
            break;
        }
    }
    cursor.expect_end()?;

    Ok(match list_path {
        Some(list_path) => Command::IndexFrom {
            list_path,
            kinds,
            taints,
            ensure_unique,
        },
        None => Command::Index {
            paths,
            kinds,
            taints,
            ensure_unique,
        },
    })
}

fn parse_config(cursor: &mut Cursor) -> CommandResult<Command> {
    match cursor.next_word() {
        Some("get") => {
            let keys = if cursor.peeks('[') {
                cursor.parse_string_list()?
            } else {
                Vec::new()
            };
            cursor.expect_end()?;
            Ok(Command::ConfigGet { keys })
        }
        Some("set") => {
            let key = cursor.parse_quoted()?;
            let value = cursor.parse_number()?;
            cursor.expect_end()?;
            Ok(Command::ConfigSet { key, value })
        }
        other => Err(CommandError::Parse(format!(
            "expected get or set after config, got {other:?}"
        ))),
    }
}

fn parse_dataset(cursor: &mut Cursor) -> CommandResult<Command> {
    let dataset = DatasetId::new(cursor.parse_quoted()?);
    match cursor.next_word() {
        Some("taint") => {
            let taint = cursor.parse_quoted()?;
            cursor.expect_end()?;
            Ok(Command::Taint {
                dataset,
                mode: TaintMode::Add,
                taint,
            })
        }
        Some("untaint") => {
            let taint = cursor.parse_quoted()?;
            cursor.expect_end()?;
            Ok(Command::Taint {
                dataset,
                mode: TaintMode::Remove,
                taint,
            })
        }
        Some("drop") => {
            cursor.expect_end()?;
            Ok(Command::DatasetDrop { dataset })
        }
        other => Err(CommandError::Parse(format!(
            "expected taint, untaint or drop, got {other:?}"
        ))),
    }
}

// ============================================================================
// Cursor
// ============================================================================

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn peeks(&mut self, ch: char) -> bool {
        self.skip_ws();
        self.input[self.pos..].starts_with(ch)
    }

    fn peeks_quote(&mut self) -> bool {
        self.peeks('"')
    }

    /// Consumes the next bare word, if any.
    fn next_word(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let rest = &self.input[self.pos..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if end == 0 {
            None
        } else {
            self.pos += end;
            Some(&rest[..end])
        }
    }

    /// Consumes `word` if it is the next bare word.
    fn eat_word(&mut self, word: &str) -> bool {
        let saved = self.pos;
        match self.next_word() {
            Some(found) if found == word => true,
            _ => {
                self.pos = saved;
                false
            }
        }
    }

    /// Parses a quoted string with `\\` and `\"` escapes.
    fn parse_quoted(&mut self) -> CommandResult<String> {
        self.skip_ws();
        let rest = &self.input[self.pos..];
        if !rest.starts_with('"') {
            return Err(CommandError::Parse(format!(
                "expected quoted string at byte {}",
                self.pos
            )));
        }
        let mut out = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((i, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\\')) => out.push('\\'),
                    _ => {
                        return Err(CommandError::Parse(
                            "bad escape in quoted string".to_string(),
                        ))
                    }
                },
                other => out.push(other),
            }
        }
        Err(CommandError::Parse("unterminated quoted string".to_string()))
    }

    fn parse_number(&mut self) -> CommandResult<u64> {
        self.skip_ws();
        let rest = &self.input[self.pos..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(CommandError::Parse(format!(
                "expected number at byte {}",
                self.pos
            )));
        }
        let value = rest[..end]
            .parse::<u64>()
            .map_err(|e| CommandError::Parse(format!("bad number: {e}")))?;
        self.pos += end;
        Ok(value)
    }

    /// Parses `[ "a", "b" ]`.
    fn parse_string_list(&mut self) -> CommandResult<Vec<String>> {
        self.expect_char('[')?;
        let mut items = Vec::new();
        if !self.peeks(']') {
            loop {
                items.push(self.parse_quoted()?);
                if !self.eat_char(',') {
                    break;
                }
            }
        }
        self.expect_char(']')?;
        Ok(items)
    }

    /// Parses `[ gram3, text4 ]`.
    fn parse_kind_list(&mut self) -> CommandResult<Vec<IndexKind>> {
        self.expect_char('[')?;
        let mut kinds = Vec::new();
        if !self.peeks(']') {
            loop {
                let Some(word) = self.next_word() else {
                    return Err(CommandError::Parse("expected index kind".to_string()));
                };
                let kind = IndexKind::parse(word).ok_or_else(|| {
                    CommandError::Parse(format!("unknown index kind {word:?}"))
                })?;
                kinds.push(kind);
                if !self.eat_char(',') {
                    break;
                }
            }
        }
        self.expect_char(']')?;
        Ok(kinds)
    }

    fn eat_char(&mut self, ch: char) -> bool {
        if self.peeks(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, ch: char) -> CommandResult<()> {
        if self.eat_char(ch) {
            Ok(())
        } else {
            Err(CommandError::Parse(format!(
                "expected {ch:?} at byte {}",
                self.pos
            )))
        }
    }

    /// Everything up to the optional trailing `;`, trimmed.
    fn rest_until_terminator(&mut self) -> &'a str {
        self.skip_ws();
        let rest = self.input[self.pos..].trim_end();
        self.pos = self.input.len();
        rest.strip_suffix(';').map_or(rest, str::trim_end)
    }

    /// Accepts an optional `;`, then requires end of input.
    fn expect_end(&mut self) -> CommandResult<()> {
        self.eat_char(';');
        self.skip_ws();
        if self.pos == self.input.len() {
            Ok(())
        } else {
            Err(CommandError::Parse(format!(
                "unexpected trailing input at byte {}",
                self.pos
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scour_query::Query;

    #[test]
    fn parses_bare_commands() {
        assert_eq!(parse_command("ping ;").unwrap(), Command::Ping);
        assert_eq!(parse_command("status").unwrap(), Command::Status);
        assert_eq!(parse_command("  topology ;").unwrap(), Command::Topology);
    }

    #[test]
    fn parses_plain_select() {
        let cmd = parse_command(r#"select "abc" ;"#).unwrap();
        assert_eq!(
            cmd,
            Command::Select {
                query: Query::literal(*b"abc"),
                taints: vec![],
                datasets: vec![],
                iterator: false,
            }
        );
    }

    #[test]
    fn parses_select_with_clauses() {
        let cmd = parse_command(
            r#"select with taints ["hot"] with datasets ["set_1", "set_2"] into iterator "abc" & "def" ;"#,
        )
        .unwrap();
        let Command::Select {
            taints,
            datasets,
            iterator,
            query,
        } = cmd
        else {
            panic!("expected select");
        };
        assert_eq!(taints, vec!["hot"]);
        assert_eq!(datasets, vec![DatasetId::new("set_1"), DatasetId::new("set_2")]);
        assert!(iterator);
        assert!(matches!(query, Query::And(_)));
    }

    #[test]
    fn parses_iterator_pop() {
        let cmd = parse_command(r#"iterator "iter_00ff" pop 40 ;"#).unwrap();
        assert_eq!(
            cmd,
            Command::IteratorPop {
                iterator: IteratorId::new("iter_00ff"),
                count: 40,
            }
        );
    }

    #[test]
    fn parses_index_variants() {
        let cmd = parse_command(r#"index "/corpus" with [gram3, text4] nocheck ;"#).unwrap();
        assert_eq!(
            cmd,
            Command::Index {
                paths: vec!["/corpus".to_string()],
                kinds: vec![IndexKind::Gram3, IndexKind::Text4],
                taints: BTreeSet::new(),
                ensure_unique: false,
            }
        );

        let cmd =
            parse_command(r#"index from list "/tmp/paths.txt" with taints ["fresh"] ;"#).unwrap();
        assert_eq!(
            cmd,
            Command::IndexFrom {
                list_path: "/tmp/paths.txt".to_string(),
                kinds: vec![],
                taints: ["fresh".to_string()].into_iter().collect(),
                ensure_unique: true,
            }
        );
    }

    #[test]
    fn parses_config_commands() {
        assert_eq!(
            parse_command("config get ;").unwrap(),
            Command::ConfigGet { keys: vec![] }
        );
        assert_eq!(
            parse_command(r#"config get ["workers"] ;"#).unwrap(),
            Command::ConfigGet {
                keys: vec!["workers".to_string()]
            }
        );
        assert_eq!(
            parse_command(r#"config set "workers" 8 ;"#).unwrap(),
            Command::ConfigSet {
                key: "workers".to_string(),
                value: 8,
            }
        );
    }

    #[test]
    fn parses_dataset_commands() {
        assert_eq!(
            parse_command(r#"dataset "set_1" taint "t1" ;"#).unwrap(),
            Command::Taint {
                dataset: DatasetId::new("set_1"),
                mode: TaintMode::Add,
                taint: "t1".to_string(),
            }
        );
        assert_eq!(
            parse_command(r#"dataset "set_1" untaint "t1" ;"#).unwrap(),
            Command::Taint {
                dataset: DatasetId::new("set_1"),
                mode: TaintMode::Remove,
                taint: "t1".to_string(),
            }
        );
        assert_eq!(
            parse_command(r#"dataset "set_1" drop ;"#).unwrap(),
            Command::DatasetDrop {
                dataset: DatasetId::new("set_1"),
            }
        );
    }

    #[test]
    fn parses_compact_and_reindex() {
        assert_eq!(
            parse_command("compact all ;").unwrap(),
            Command::Compact {
                kind: CompactKind::All
            }
        );
        assert_eq!(
            parse_command("compact smart ;").unwrap(),
            Command::Compact {
                kind: CompactKind::Smart
            }
        );
        assert_eq!(
            parse_command(r#"reindex "set_9" ;"#).unwrap(),
            Command::Reindex {
                dataset: DatasetId::new("set_9"),
            }
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("").is_err());
        assert!(parse_command("selct \"abc\" ;").is_err());
        assert!(parse_command("select ;").is_err());
        assert!(parse_command("index ;").is_err());
        assert!(parse_command("compact sometimes ;").is_err());
        assert!(parse_command(r#"index "/x" with [gram9] ;"#).is_err());
        assert!(parse_command("ping extra ;").is_err());
        assert!(parse_command(r#"iterator "x" pop abc ;"#).is_err());
    }

    #[test]
    fn query_error_surfaces_from_select() {
        assert!(matches!(
            parse_command(r#"select "ab" ;"#),
            Err(CommandError::Query(_))
        ));
    }
}
