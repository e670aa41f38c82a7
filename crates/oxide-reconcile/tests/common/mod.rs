//! In-memory stand-in for a MySQL catalog.
//!
//! `MemoryDatabase` understands the DDL subset the reconciler emits and keeps
//! the resulting tables the way `information_schema` would report them, so a
//! full reconcile, apply, re-introspect cycle can run without a server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use oxide_reconcile::error::{ReconcileError, Result};
use oxide_reconcile::introspect::{
    IntrospectedColumn, IntrospectedConstraints, LiveForeignKey, LiveTable, SchemaIntrospector,
    SqlExecutor, TableAttributes,
};
use oxide_reconcile::schema::ForeignKeyAction;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Word(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Eq,
}

fn tokenize(sql: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '`' => {
                let mut ident = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('`') if chars.get(i + 1) == Some(&'`') => {
                            ident.push('`');
                            i += 2;
                        }
                        Some('`') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            ident.push(ch);
                            i += 1;
                        }
                        None => return Err("unterminated identifier".into()),
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            value.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = match chars.get(i + 1) {
                                Some('n') => '\n',
                                Some('r') => '\r',
                                Some('0') => '\0',
                                Some(&other) => other,
                                None => return Err("dangling escape".into()),
                            };
                            value.push(escaped);
                            i += 2;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                        None => return Err("unterminated string".into()),
                    }
                }
                tokens.push(Token::Str(value));
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | ',' | '=' | '`' | '\'')
                {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

enum Value {
    Literal(String),
    Expression(String),
}

struct ColumnDef {
    column: IntrospectedColumn,
    primary_key: bool,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn new(sql: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(sql)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> ParseResult<Token> {
        let token = self.tokens.get(self.pos).cloned().ok_or("unexpected end")?;
        self.pos += 1;
        Ok(token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn is_word(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_word(&mut self, keyword: &str) -> bool {
        if self.is_word(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_word(keyword) {
            Ok(())
        } else {
            Err(format!("expected {} at {:?}", keyword, self.peek()))
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        let next = self.next()?;
        if next == token {
            Ok(())
        } else {
            Err(format!("expected {:?}, got {:?}", token, next))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> ParseResult<String> {
        match self.next()? {
            Token::Ident(name) | Token::Word(name) => Ok(name),
            other => Err(format!("expected a name, got {:?}", other)),
        }
    }

    fn string(&mut self) -> ParseResult<String> {
        match self.next()? {
            Token::Str(value) => Ok(value),
            other => Err(format!("expected a string, got {:?}", other)),
        }
    }

    fn name_list(&mut self) -> ParseResult<Vec<String>> {
        self.expect(Token::LParen)?;
        let mut names = vec![self.name()?];
        while self.eat(&Token::Comma) {
            names.push(self.name()?);
        }
        self.expect(Token::RParen)?;
        Ok(names)
    }

    fn raw_group(&mut self) -> ParseResult<String> {
        self.expect(Token::LParen)?;
        let mut depth = 1;
        let mut raw = String::new();
        loop {
            match self.next()? {
                Token::LParen => {
                    depth += 1;
                    raw.push('(');
                }
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(raw);
                    }
                    raw.push(')');
                }
                Token::Comma => raw.push(','),
                Token::Eq => raw.push('='),
                Token::Word(w) | Token::Ident(w) => raw.push_str(&w),
                Token::Str(s) => raw.push_str(&format!("'{}'", s)),
            }
        }
    }

    fn value(&mut self) -> ParseResult<Value> {
        match self.peek() {
            Some(Token::Str(_)) => Ok(Value::Literal(self.string()?)),
            Some(Token::LParen) => Ok(Value::Expression(self.raw_group()?)),
            _ => {
                let word = self.name()?;
                match word.to_ascii_uppercase().as_str() {
                    "TRUE" => return Ok(Value::Literal("1".into())),
                    "FALSE" => return Ok(Value::Literal("0".into())),
                    _ => {}
                }
                if word.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
                    return Ok(Value::Literal(word));
                }
                if self.peek() == Some(&Token::LParen) {
                    let args = self.raw_group()?;
                    return Ok(Value::Expression(format!("{}({})", word, args)));
                }
                Ok(Value::Expression(word))
            }
        }
    }

    fn column_type(&mut self) -> ParseResult<String> {
        let mut sql_type = self.name()?.to_ascii_lowercase();
        if self.peek() == Some(&Token::LParen) {
            sql_type.push_str(&format!("({})", self.raw_group()?));
        }
        while self.is_word("unsigned") || self.is_word("zerofill") {
            sql_type.push(' ');
            sql_type.push_str(&self.name()?.to_ascii_lowercase());
        }
        Ok(match sql_type.as_str() {
            "integer" => "int".to_string(),
            "bool" | "boolean" => "tinyint(1)".to_string(),
            _ => sql_type,
        })
    }

    fn column_def(&mut self) -> ParseResult<ColumnDef> {
        let name = self.name()?;
        let column_type = self.column_type()?;
        let mut column = IntrospectedColumn {
            name,
            column_type,
            default: None,
            comment: String::new(),
            extra: String::new(),
            nullable: true,
        };
        let mut primary_key = false;
        let mut extras: Vec<String> = Vec::new();

        loop {
            if self.eat_word("AUTO_INCREMENT") {
                extras.push("auto_increment".into());
            } else if self.eat_word("PRIMARY") {
                self.expect_word("KEY")?;
                primary_key = true;
                column.nullable = false;
            } else if self.eat_word("NOT") {
                self.expect_word("NULL")?;
                column.nullable = false;
            } else if self.eat_word("NULL") {
                column.nullable = true;
            } else if self.eat_word("DEFAULT") {
                match self.value()? {
                    Value::Literal(v) => column.default = Some(v),
                    Value::Expression(e) => {
                        column.default = Some(e);
                        extras.insert(0, "DEFAULT_GENERATED".into());
                    }
                }
            } else if self.eat_word("ON") {
                self.expect_word("UPDATE")?;
                let value = match self.value()? {
                    Value::Literal(v) | Value::Expression(v) => v,
                };
                extras.push(format!("on update {}", value));
            } else if self.eat_word("COMMENT") {
                column.comment = self.string()?;
            } else {
                break;
            }
        }

        column.extra = extras.join(" ");
        Ok(ColumnDef {
            column,
            primary_key,
        })
    }

    fn action(&mut self) -> ParseResult<ForeignKeyAction> {
        let mut rule = self.name()?;
        if rule.eq_ignore_ascii_case("NO") || rule.eq_ignore_ascii_case("SET") {
            rule = format!("{} {}", rule, self.name()?);
        }
        ForeignKeyAction::parse(&rule).ok_or_else(|| format!("unknown action {}", rule))
    }

    /// `FOREIGN KEY (c) REFERENCES t (rc) [ON DELETE a] [ON UPDATE a]`
    fn foreign_key(&mut self, constraint_name: String) -> ParseResult<(String, LiveForeignKey)> {
        self.expect_word("FOREIGN")?;
        self.expect_word("KEY")?;
        let column = self.name_list()?.remove(0);
        self.expect_word("REFERENCES")?;
        let referenced_table = self.name()?;
        let referenced_column = self.name_list()?.remove(0);
        let mut fk = LiveForeignKey {
            constraint_name,
            referenced_table,
            referenced_column,
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        };
        while self.eat_word("ON") {
            if self.eat_word("DELETE") {
                fk.on_delete = self.action()?;
            } else {
                self.expect_word("UPDATE")?;
                fk.on_update = self.action()?;
            }
        }
        Ok((column, fk))
    }
}

fn row_format_name(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn default_attributes() -> TableAttributes {
    TableAttributes {
        comment: String::new(),
        collation: Some("utf8mb4_0900_ai_ci".into()),
        row_format: Some("Dynamic".into()),
    }
}

#[derive(Debug, Default)]
struct State {
    order: Vec<String>,
    tables: HashMap<String, LiveTable>,
    executed: Vec<String>,
    fail_on: Vec<String>,
}

impl State {
    fn table_mut(&mut self, name: &str) -> ParseResult<&mut LiveTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| format!("Table '{}' doesn't exist", name))
    }

    fn run(&mut self, sql: &str) -> ParseResult<()> {
        let mut p = Parser::new(sql)?;
        if p.eat_word("ANALYZE") {
            return Ok(());
        }
        if p.eat_word("CREATE") {
            if p.eat_word("INDEX") {
                let index = p.name()?;
                p.expect_word("ON")?;
                let table = p.name()?;
                p.name_list()?;
                self.table_mut(&table)?.constraints.indexes.insert(index);
                return Ok(());
            }
            return self.create_table(&mut p);
        }
        if p.eat_word("DROP") {
            p.expect_word("INDEX")?;
            let index = p.name()?;
            p.expect_word("ON")?;
            let table = self.table_mut(&p.name()?)?;
            if !table.constraints.indexes.remove(&index) && !table.constraints.unique.remove(&index)
            {
                return Err(format!("Can't DROP '{}'; check that it exists", index));
            }
            return Ok(());
        }
        p.expect_word("ALTER")?;
        p.expect_word("TABLE")?;
        let name = p.name()?;
        let table = self.table_mut(&name)?;
        alter_table(table, &mut p)
    }

    fn create_table(&mut self, p: &mut Parser) -> ParseResult<()> {
        p.expect_word("TABLE")?;
        let if_not_exists = p.eat_word("IF");
        if if_not_exists {
            p.expect_word("NOT")?;
            p.expect_word("EXISTS")?;
        }
        let name = p.name()?;
        if self.tables.contains_key(&name) {
            return if if_not_exists {
                Ok(())
            } else {
                Err(format!("Table '{}' already exists", name))
            };
        }

        let mut table = LiveTable {
            name: name.clone(),
            attributes: default_attributes(),
            ..LiveTable::default()
        };

        p.expect(Token::LParen)?;
        loop {
            if p.eat_word("UNIQUE") {
                p.eat_word("KEY");
                let index = p.name()?;
                p.name_list()?;
                table.constraints.unique.insert(index);
            } else if p.eat_word("INDEX") || p.eat_word("KEY") {
                let index = p.name()?;
                p.name_list()?;
                table.constraints.indexes.insert(index);
            } else if p.eat_word("CONSTRAINT") {
                let constraint = p.name()?;
                let (column, fk) = p.foreign_key(constraint)?;
                table.constraints.foreign_keys.insert(column, fk);
            } else if p.eat_word("PRIMARY") {
                p.expect_word("KEY")?;
                table.constraints.primary_key = p.name_list()?;
            } else {
                let def = p.column_def()?;
                if def.primary_key {
                    table.constraints.primary_key = vec![def.column.name.clone()];
                }
                table.columns.push(def.column);
            }
            if !p.eat(&Token::Comma) {
                break;
            }
        }
        p.expect(Token::RParen)?;

        while !p.at_end() {
            let option = p.name()?.to_ascii_uppercase();
            p.eat(&Token::Eq);
            match option.as_str() {
                "COMMENT" => table.attributes.comment = p.string()?,
                "COLLATE" => table.attributes.collation = Some(p.name()?),
                "ROW_FORMAT" => table.attributes.row_format = Some(row_format_name(&p.name()?)),
                other => return Err(format!("unsupported table option {}", other)),
            }
        }

        self.order.push(name.clone());
        self.tables.insert(name, table);
        Ok(())
    }
}

fn column_index(table: &LiveTable, name: &str) -> ParseResult<usize> {
    table
        .columns
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| format!("Unknown column '{}' in '{}'", name, table.name))
}

fn alter_table(table: &mut LiveTable, p: &mut Parser) -> ParseResult<()> {
    if p.eat_word("ADD") {
        if p.eat_word("COLUMN") {
            let def = p.column_def()?;
            if table.get_column(&def.column.name).is_some() {
                return Err(format!("Duplicate column name '{}'", def.column.name));
            }
            if def.primary_key {
                if table.constraints.has_primary_key() {
                    return Err("Multiple primary key defined".into());
                }
                table.constraints.primary_key = vec![def.column.name.clone()];
            }
            table.columns.push(def.column);
        } else if p.eat_word("PRIMARY") {
            p.expect_word("KEY")?;
            if table.constraints.has_primary_key() {
                return Err("Multiple primary key defined".into());
            }
            let columns = p.name_list()?;
            for column in &columns {
                let idx = column_index(table, column)?;
                table.columns[idx].nullable = false;
            }
            table.constraints.primary_key = columns;
        } else {
            p.expect_word("CONSTRAINT")?;
            let constraint = p.name()?;
            if p.eat_word("UNIQUE") {
                let column = p.name_list()?.remove(0);
                column_index(table, &column)?;
                table.constraints.unique.insert(constraint);
            } else {
                let (column, fk) = p.foreign_key(constraint)?;
                column_index(table, &column)?;
                table.constraints.foreign_keys.insert(column, fk);
            }
        }
        return Ok(());
    }

    if p.eat_word("DROP") {
        if p.eat_word("COLUMN") {
            let name = p.name()?;
            let idx = column_index(table, &name)?;
            table.columns.remove(idx);
            table.constraints.primary_key.retain(|c| *c != name);
            table.constraints.foreign_keys.remove(&name);
        } else if p.eat_word("PRIMARY") {
            p.expect_word("KEY")?;
            if !table.constraints.has_primary_key() {
                return Err("Can't DROP 'PRIMARY'; check that column/key exists".into());
            }
            table.constraints.primary_key.clear();
        } else if p.eat_word("INDEX") {
            let index = p.name()?;
            if !table.constraints.unique.remove(&index) && !table.constraints.indexes.remove(&index)
            {
                return Err(format!("Can't DROP '{}'; check that it exists", index));
            }
        } else {
            p.expect_word("FOREIGN")?;
            p.expect_word("KEY")?;
            let constraint = p.name()?;
            let before = table.constraints.foreign_keys.len();
            table
                .constraints
                .foreign_keys
                .retain(|_, fk| fk.constraint_name != constraint);
            if table.constraints.foreign_keys.len() == before {
                return Err(format!("Can't DROP '{}'; check that it exists", constraint));
            }
        }
        return Ok(());
    }

    if p.eat_word("MODIFY") {
        p.expect_word("COLUMN")?;
        let def = p.column_def()?;
        let idx = column_index(table, &def.column.name)?;
        table.columns[idx] = def.column;
        return Ok(());
    }

    if p.eat_word("CHANGE") {
        p.expect_word("COLUMN")?;
        let old = p.name()?;
        let def = p.column_def()?;
        let idx = column_index(table, &old)?;
        let new_name = def.column.name.clone();
        table.columns[idx] = def.column;
        for key in &mut table.constraints.primary_key {
            if *key == old {
                key.clone_from(&new_name);
            }
        }
        if let Some(fk) = table.constraints.foreign_keys.remove(&old) {
            table.constraints.foreign_keys.insert(new_name, fk);
        }
        return Ok(());
    }

    if p.eat_word("ALTER") {
        p.expect_word("COLUMN")?;
        let name = p.name()?;
        let idx = column_index(table, &name)?;
        if p.eat_word("DROP") {
            p.expect_word("DEFAULT")?;
            table.columns[idx].default = None;
        } else {
            p.expect_word("SET")?;
            p.expect_word("DEFAULT")?;
            table.columns[idx].default = Some(match p.value()? {
                Value::Literal(v) | Value::Expression(v) => v,
            });
        }
        return Ok(());
    }

    if p.eat_word("COMMENT") {
        p.eat(&Token::Eq);
        table.attributes.comment = p.string()?;
        return Ok(());
    }

    if p.eat_word("ROW_FORMAT") {
        p.eat(&Token::Eq);
        table.attributes.row_format = Some(row_format_name(&p.name()?));
        return Ok(());
    }

    p.expect_word("CONVERT")?;
    p.expect_word("TO")?;
    p.expect_word("CHARACTER")?;
    p.expect_word("SET")?;
    p.name()?;
    p.expect_word("COLLATE")?;
    table.attributes.collation = Some(p.name()?);
    Ok(())
}

/// Fake MySQL database.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs setup DDL, panicking on failure.
    pub fn setup(&self, statements: &[&str]) {
        let mut state = self.state.lock().unwrap();
        for sql in statements {
            state
                .run(sql)
                .unwrap_or_else(|e| panic!("setup statement failed: {}: {}", sql, e));
        }
    }

    /// Puts a table into the catalog as-is, bypassing DDL.
    pub fn insert_table(&self, table: LiveTable) {
        let mut state = self.state.lock().unwrap();
        state.order.push(table.name.clone());
        state.tables.insert(table.name.clone(), table);
    }

    /// Makes every statement containing `needle` fail.
    pub fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_on.push(needle.to_string());
    }

    /// Statements executed through [`SqlExecutor`], in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn clear_executed(&self) {
        self.state.lock().unwrap().executed.clear();
    }

    /// Tables in creation order.
    pub fn table_order(&self) -> Vec<String> {
        self.state.lock().unwrap().order.clone()
    }

    pub fn table(&self, name: &str) -> Option<LiveTable> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn column_names(&self, table: &str) -> Vec<String> {
        self.table(table)
            .map(|t| t.columns.into_iter().map(|c| c.name).collect())
            .unwrap_or_default()
    }
}

fn db_error(message: String) -> ReconcileError {
    ReconcileError::Io(std::io::Error::other(message))
}

impl SqlExecutor for MemoryDatabase {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if !sql.starts_with("ANALYZE") {
            state.executed.push(sql.to_string());
        }
        if state.fail_on.iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(db_error(format!("injected failure: {}", sql)));
        }
        state.run(sql).map_err(db_error)?;
        Ok(0)
    }
}

impl SchemaIntrospector for MemoryDatabase {
    async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.table_order())
    }

    async fn columns(&self, table: &str) -> Result<Vec<IntrospectedColumn>> {
        Ok(self.table(table).map(|t| t.columns).unwrap_or_default())
    }

    async fn constraints(&self, table: &str) -> Result<IntrospectedConstraints> {
        Ok(self.table(table).map(|t| t.constraints).unwrap_or_default())
    }

    async fn table_attributes(&self, table: &str) -> Result<TableAttributes> {
        self.table(table)
            .map(|t| t.attributes)
            .ok_or_else(|| ReconcileError::Introspection {
                table: table.to_string(),
                message: "table does not exist".to_string(),
            })
    }
}
