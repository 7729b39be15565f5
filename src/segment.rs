//! Splitting SQL text into statements and finding the one under a caret.
//!
//! Ranges are byte offsets into the source text. A statement owns its text
//! up to and including the `;` that terminates it; whitespace, comments and
//! empty statements between statements belong to none.

use std::ops::Range;

use crate::{BunnyDbError, Result};

/// Quoting and comment rules used while splitting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `'…'`, `"…"`, `` `…` ``, `[…]`; `CREATE TRIGGER … BEGIN … END` bodies.
    #[default]
    Sqlite,
    /// `'…'`, `"…"`, `E'…'` escapes, `$tag$ … $tag$`, nested block comments.
    Postgres,
    /// `'…'` and `"…"` with backslash escapes, `` `…` ``, `#` comments.
    MySql,
}

/// One statement of a segmented script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    /// Position in the script, starting at 0.
    pub index: usize,
    /// Source text covered by `range`.
    pub text: String,
    /// Half-open byte range in the source.
    pub range: Range<usize>,
}

/// Splits `sql` into statements.
///
/// Unterminated strings, quoted identifiers and block comments fail the
/// whole input with [`BunnyDbError::Segmentation`].
pub fn segment(sql: &str, dialect: Dialect) -> Result<Vec<Statement>> {
    Splitter::new(sql, dialect).run()
}

/// Returns the statement whose range contains `offset`.
///
/// A caret on a `;` resolves to the statement that `;` terminates.
pub fn locate(statements: &[Statement], offset: usize) -> Option<&Statement> {
    let idx = statements.partition_point(|statement| statement.range.end <= offset);
    statements
        .get(idx)
        .filter(|statement| statement.range.start <= offset)
}

struct Splitter<'a> {
    sql: &'a str,
    bytes: &'a [u8],
    dialect: Dialect,
    pos: usize,
}

/// Per-statement state for trigger bodies.
#[derive(Default)]
struct BlockState {
    head: Vec<String>,
    is_trigger: bool,
    depth: usize,
}

impl BlockState {
    fn on_word(&mut self, word: &str) {
        if !self.is_trigger {
            if self.head.len() < 3 {
                self.head.push(word.to_ascii_uppercase());
                self.is_trigger = self.starts_trigger();
            }
            return;
        }

        if word.eq_ignore_ascii_case("BEGIN") {
            self.depth += 1;
        } else if word.eq_ignore_ascii_case("CASE") && self.depth > 0 {
            self.depth += 1;
        } else if word.eq_ignore_ascii_case("END") {
            self.depth = self.depth.saturating_sub(1);
        }
    }

    fn starts_trigger(&self) -> bool {
        let head: Vec<&str> = self.head.iter().map(String::as_str).collect();
        matches!(
            head.as_slice(),
            ["CREATE", "TRIGGER", ..] | ["CREATE", "TEMP" | "TEMPORARY", "TRIGGER"]
        )
    }
}

impl<'a> Splitter<'a> {
    fn new(sql: &'a str, dialect: Dialect) -> Self {
        Self {
            sql,
            bytes: sql.as_bytes(),
            dialect,
            pos: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.pos >= self.bytes.len() {
                break;
            }
            let range = self.scan_statement()?;
            statements.push(Statement {
                index: statements.len(),
                text: self.sql[range.clone()].to_owned(),
                range,
            });
        }
        Ok(statements)
    }

    /// Skips whitespace, comments and empty statements.
    fn skip_trivia(&mut self) -> Result<()> {
        while let Some(&byte) = self.bytes.get(self.pos) {
            if byte.is_ascii_whitespace() || byte == b';' {
                self.pos += 1;
            } else if !self.skip_comment()? {
                break;
            }
        }
        Ok(())
    }

    /// Scans one statement starting at `self.pos` and returns its range.
    fn scan_statement(&mut self) -> Result<Range<usize>> {
        let start = self.pos;
        let mut content_end = start;
        let mut block = BlockState::default();

        while let Some(&byte) = self.bytes.get(self.pos) {
            if byte.is_ascii_whitespace() {
                self.pos += 1;
                continue;
            }
            if self.skip_comment()? {
                continue;
            }

            match byte {
                b';' if block.depth == 0 => {
                    self.pos += 1;
                    return Ok(start..self.pos);
                }
                b'\'' => self.skip_quoted(b'\'', self.dialect == Dialect::MySql)?,
                b'"' => self.skip_quoted(b'"', self.dialect == Dialect::MySql)?,
                b'`' if self.dialect != Dialect::Postgres => self.skip_quoted(b'`', false)?,
                b'[' if self.dialect == Dialect::Sqlite => self.skip_bracketed()?,
                b'$' if self.dialect == Dialect::Postgres => self.skip_dollar_quoted()?,
                _ if is_word_byte(byte) => {
                    let word = self.read_word();
                    if self.dialect == Dialect::Postgres
                        && word.eq_ignore_ascii_case("e")
                        && self.bytes.get(self.pos) == Some(&b'\'')
                    {
                        self.skip_quoted(b'\'', true)?;
                    } else if self.dialect == Dialect::Sqlite {
                        block.on_word(word);
                    }
                }
                _ => self.pos += 1,
            }
            content_end = self.pos;
        }

        Ok(start..content_end)
    }

    /// Skips a comment at `self.pos`, returning whether one was found.
    fn skip_comment(&mut self) -> Result<bool> {
        let byte = self.bytes[self.pos];
        let next = self.bytes.get(self.pos + 1).copied();

        let line_comment = match (byte, next) {
            (b'-', Some(b'-')) => {
                self.dialect != Dialect::MySql
                    || self
                        .bytes
                        .get(self.pos + 2)
                        .map_or(true, u8::is_ascii_whitespace)
            }
            (b'#', _) => self.dialect == Dialect::MySql,
            _ => false,
        };
        if line_comment {
            self.pos = self.sql[self.pos..]
                .find('\n')
                .map_or(self.bytes.len(), |idx| self.pos + idx + 1);
            return Ok(true);
        }

        if (byte, next) == (b'/', Some(b'*')) {
            self.skip_block_comment()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let start = self.pos;
        let nested = self.dialect == Dialect::Postgres;
        let mut depth = 0usize;

        while self.pos < self.bytes.len() {
            match (self.bytes[self.pos], self.bytes.get(self.pos + 1).copied()) {
                (b'/', Some(b'*')) if depth == 0 || nested => {
                    depth += 1;
                    self.pos += 2;
                }
                (b'*', Some(b'/')) => {
                    depth -= 1;
                    self.pos += 2;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => self.pos += 1,
            }
        }
        Err(unterminated(start, "block comment"))
    }

    /// Skips a quoted run where a doubled quote is an escaped quote.
    fn skip_quoted(&mut self, quote: u8, backslash_escapes: bool) -> Result<()> {
        let start = self.pos;
        self.pos += 1;

        while let Some(&byte) = self.bytes.get(self.pos) {
            if backslash_escapes && byte == b'\\' {
                self.pos += 2;
            } else if byte == quote {
                if self.bytes.get(self.pos + 1) == Some(&quote) {
                    self.pos += 2;
                } else {
                    self.pos += 1;
                    return Ok(());
                }
            } else {
                self.pos += 1;
            }
        }

        let what = match quote {
            b'\'' => "string literal",
            _ => "quoted identifier",
        };
        Err(unterminated(start, what))
    }

    fn skip_bracketed(&mut self) -> Result<()> {
        let start = self.pos;
        match self.sql[self.pos..].find(']') {
            Some(idx) => {
                self.pos += idx + 1;
                Ok(())
            }
            None => Err(unterminated(start, "quoted identifier")),
        }
    }

    /// Skips `$tag$ … $tag$`; a `$` that does not open a tag (such as the
    /// `$1` placeholder) is consumed as a plain byte.
    fn skip_dollar_quoted(&mut self) -> Result<()> {
        let start = self.pos;
        let rest = &self.bytes[start + 1..];
        let tag_len = rest
            .iter()
            .position(|&byte| byte == b'$')
            .filter(|&len| {
                let tag = &rest[..len];
                tag.first().map_or(true, |first| !first.is_ascii_digit())
                    && tag.iter().all(|&byte| is_word_byte(byte))
            });

        let Some(tag_len) = tag_len else {
            self.pos += 1;
            return Ok(());
        };

        let delimiter = &self.sql[start..start + tag_len + 2];
        let body_start = start + delimiter.len();
        match self.sql[body_start..].find(delimiter) {
            Some(idx) => {
                self.pos = body_start + idx + delimiter.len();
                Ok(())
            }
            None => Err(unterminated(start, "dollar-quoted string")),
        }
    }

    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|&byte| is_word_byte(byte))
        {
            self.pos += 1;
        }
        &self.sql[start..self.pos]
    }
}

/// Identifier/keyword byte; non-ASCII bytes keep multi-byte characters whole.
fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte >= 0x80
}

fn unterminated(offset: usize, what: &str) -> BunnyDbError {
    BunnyDbError::Segmentation {
        offset,
        message: format!("unterminated {what}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{locate, segment, Dialect, Statement};
    use crate::BunnyDbError;

    fn texts(sql: &str, dialect: Dialect) -> Vec<String> {
        segment(sql, dialect)
            .expect("must segment")
            .into_iter()
            .map(|statement| statement.text)
            .collect()
    }

    fn segmentation_offset(sql: &str, dialect: Dialect) -> usize {
        match segment(sql, dialect) {
            Err(BunnyDbError::Segmentation { offset, .. }) => offset,
            other => panic!("expected segmentation error, got {other:?}"),
        }
    }

    #[test]
    fn splits_on_top_level_semicolons() {
        let statements = segment("SELECT 1; SELECT 2;", Dialect::Sqlite).expect("must segment");
        assert_eq!(
            statements,
            vec![
                Statement {
                    index: 0,
                    text: "SELECT 1;".to_owned(),
                    range: 0..9,
                },
                Statement {
                    index: 1,
                    text: "SELECT 2;".to_owned(),
                    range: 10..19,
                },
            ]
        );
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        for sql in ["", "   \n\t", "-- only a note", "/* block */", ";; ;"] {
            assert!(
                segment(sql, Dialect::Sqlite).expect("must segment").is_empty(),
                "{sql:?}"
            );
        }
    }

    #[test]
    fn final_statement_without_semicolon() {
        assert_eq!(
            texts("SELECT 1;\n  INSERT INTO t VALUES (1)  \n", Dialect::Sqlite),
            vec!["SELECT 1;", "INSERT INTO t VALUES (1)"]
        );
    }

    #[test]
    fn semicolons_inside_literals_and_identifiers() {
        assert_eq!(
            texts(
                "SELECT 'a;b', 'it''s; fine'; SELECT \"x;y\" FROM t",
                Dialect::Sqlite
            ),
            vec!["SELECT 'a;b', 'it''s; fine';", "SELECT \"x;y\" FROM t"]
        );
        assert_eq!(
            texts("SELECT [a;b], `c;d` FROM t; SELECT 2;", Dialect::Sqlite),
            vec!["SELECT [a;b], `c;d` FROM t;", "SELECT 2;"]
        );
    }

    #[test]
    fn semicolons_inside_comments() {
        assert_eq!(
            texts("SELECT 1 /* ; */ ; -- ; \nSELECT 2 -- done", Dialect::Sqlite),
            vec!["SELECT 1 /* ; */ ;", "SELECT 2"]
        );
    }

    #[test]
    fn leading_comments_are_not_owned() {
        let statements =
            segment("-- header\n/* x */ SELECT 1;", Dialect::Sqlite).expect("must segment");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].range, 18..27);
        assert_eq!(statements[0].text, "SELECT 1;");
    }

    #[test]
    fn unterminated_constructs_fail_whole_input() {
        assert_eq!(segmentation_offset("SELECT 1; SELECT 'abc; SELECT 2;", Dialect::Sqlite), 17);
        assert_eq!(segmentation_offset("SELECT 1; /* oops", Dialect::Sqlite), 10);
        assert_eq!(segmentation_offset("SELECT \"abc", Dialect::Sqlite), 7);
        assert_eq!(segmentation_offset("SELECT [abc", Dialect::Sqlite), 7);
        assert_eq!(segmentation_offset("SELECT $a$ body", Dialect::Postgres), 7);
    }

    #[test]
    fn trigger_body_keeps_inner_semicolons() {
        let sql = "CREATE TEMP TRIGGER tr AFTER INSERT ON t BEGIN \
                   UPDATE c SET n = n + 1; \
                   SELECT CASE WHEN 1 THEN 2 END; \
                   END; SELECT 1;";
        let statements = texts(sql, Dialect::Sqlite);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("END; END;"));
        assert_eq!(statements[1], "SELECT 1;");
    }

    #[test]
    fn begin_outside_trigger_is_plain_statement() {
        assert_eq!(
            texts("BEGIN; INSERT INTO t VALUES (1); END;", Dialect::Sqlite),
            vec!["BEGIN;", "INSERT INTO t VALUES (1);", "END;"]
        );
    }

    #[test]
    fn postgres_dollar_quotes_and_escape_strings() {
        assert_eq!(
            texts(
                "CREATE FUNCTION f() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql; \
                 SELECT $1; SELECT $$a;b$$;",
                Dialect::Postgres
            ),
            vec![
                "CREATE FUNCTION f() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql;",
                "SELECT $1;",
                "SELECT $$a;b$$;",
            ]
        );
        assert_eq!(
            texts("SELECT E'a\\';b'; SELECT 2;", Dialect::Postgres),
            vec!["SELECT E'a\\';b';", "SELECT 2;"]
        );
        assert_eq!(
            texts("SELECT 1 /* outer /* inner; */ still; */; SELECT 2;", Dialect::Postgres),
            vec!["SELECT 1 /* outer /* inner; */ still; */;", "SELECT 2;"]
        );
    }

    #[test]
    fn mysql_escapes_and_hash_comments() {
        assert_eq!(
            texts("SELECT 'a\\'b;c'; # note ;\nSELECT `x;y`;", Dialect::MySql),
            vec!["SELECT 'a\\'b;c';", "SELECT `x;y`;"]
        );
    }

    #[test]
    fn ranges_are_byte_offsets_into_source() {
        let sql = "SELECT 'héllo';\n\nSELECT 'ü' AS x;";
        let statements = segment(sql, Dialect::Sqlite).expect("must segment");
        assert_eq!(statements.len(), 2);
        for statement in &statements {
            assert_eq!(&sql[statement.range.clone()], statement.text);
        }
    }

    #[test]
    fn ranges_reconstruct_source_modulo_separators() {
        let sql = "  SELECT 1;\n\nSELECT 2;   ;\n INSERT INTO t VALUES (1)\n";
        let statements = segment(sql, Dialect::Sqlite).expect("must segment");

        let indexes: Vec<usize> = statements.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        for pair in statements.windows(2) {
            assert!(pair[0].range.end <= pair[1].range.start);
        }

        let joined: Vec<&str> = statements.iter().map(|s| &sql[s.range.clone()]).collect();
        assert_eq!(
            joined.join(" "),
            "SELECT 1; SELECT 2; INSERT INTO t VALUES (1)"
        );
    }

    #[test]
    fn locate_finds_enclosing_statement() {
        let sql = "SELECT 1;  SELECT 2;";
        let statements = segment(sql, Dialect::Sqlite).expect("must segment");

        for offset in 0..9 {
            assert_eq!(locate(&statements, offset).map(|s| s.index), Some(0));
        }
        for offset in 11..20 {
            assert_eq!(locate(&statements, offset).map(|s| s.index), Some(1));
        }
        for offset in [9, 10, 20, 100] {
            assert!(locate(&statements, offset).is_none(), "offset {offset}");
        }
    }

    #[test]
    fn locate_caret_on_separator_belongs_to_previous() {
        let statements = segment("SELECT 1;SELECT 2;", Dialect::Sqlite).expect("must segment");
        assert_eq!(locate(&statements, 8).map(|s| s.index), Some(0));
        assert_eq!(locate(&statements, 9).map(|s| s.index), Some(1));
    }

    #[test]
    fn locate_in_empty_list() {
        assert!(locate(&[], 0).is_none());
    }
}
