//! Cell transformation — applies configured mapping rules to one data
//! row, producing a field map plus per-field errors.
//!
//! Rules are applied in configuration order; a formula rule may
//! reference any field transformed before it.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value};

use crate::import::tabular::TabularFile;
use crate::import::types::{LookupTarget, MappingConfig, MappingRule, RowError, Transform};
use crate::store::Store;
use crate::store::models::Role;

/// A transformed row: target fields and the errors hit on the way.
pub type TransformedRow = (Map<String, Value>, Vec<RowError>);

/// Apply every mapping rule to one row.
pub async fn transform_row(
    file: &TabularFile,
    row: &[String],
    mapping: &MappingConfig,
    store: &Arc<dyn Store>,
) -> TransformedRow {
    let mut fields = Map::new();
    let mut errors = Vec::new();

    for rule in &mapping.rules {
        // Formulas draw on already-transformed fields, not a cell.
        if let Some(Transform::Formula { ref expression }) = rule.transform {
            match eval_formula(expression, &fields) {
                Ok(value) => match serde_json::Number::from_f64(value) {
                    Some(n) => {
                        fields.insert(rule.target_field.clone(), Value::Number(n));
                    }
                    None => errors.push(RowError::new(
                        &rule.target_field,
                        "formula produced a non-finite number",
                    )),
                },
                Err(e) => errors.push(RowError::new(&rule.target_field, e)),
            }
            continue;
        }

        let raw = file
            .cell(row, &rule.column)
            .map(str::to_string)
            .or_else(|| rule.default_value.clone());
        let Some(raw) = raw else {
            continue; // absent and no default — validation handles `required`
        };

        match rule.transform.as_ref().unwrap_or(&Transform::Passthrough) {
            Transform::Passthrough => {
                fields.insert(rule.target_field.clone(), Value::String(raw));
            }
            Transform::Date { input_format } => match reparse_date(&raw, input_format) {
                Ok(iso) => {
                    fields.insert(rule.target_field.clone(), Value::String(iso));
                }
                Err(e) => errors.push(RowError::new(&rule.target_field, e)),
            },
            Transform::Phone { country_prefix } => {
                fields.insert(
                    rule.target_field.clone(),
                    Value::String(normalize_phone(&raw, country_prefix.as_deref())),
                );
            }
            Transform::Number {
                decimal_separator,
                thousands_separator,
            } => match parse_localized_number(&raw, *decimal_separator, *thousands_separator) {
                Ok(dec) => match dec.to_f64().and_then(serde_json::Number::from_f64) {
                    Some(n) => {
                        fields.insert(rule.target_field.clone(), Value::Number(n));
                    }
                    None => errors.push(RowError::new(
                        &rule.target_field,
                        format!("number out of range: {raw}"),
                    )),
                },
                Err(e) => errors.push(RowError::new(&rule.target_field, e)),
            },
            Transform::Boolean {
                true_tokens,
                false_tokens,
            } => {
                let lower = raw.trim().to_lowercase();
                if true_tokens.iter().any(|t| t.to_lowercase() == lower) {
                    fields.insert(rule.target_field.clone(), Value::Bool(true));
                } else if false_tokens.iter().any(|t| t.to_lowercase() == lower) {
                    fields.insert(rule.target_field.clone(), Value::Bool(false));
                } else {
                    errors.push(RowError::new(
                        &rule.target_field,
                        format!("unrecognized boolean token: {raw}"),
                    ));
                }
            }
            Transform::Lookup { target } => match resolve_lookup(store, *target, &raw).await {
                Ok(Some(id)) => {
                    fields.insert(rule.target_field.clone(), Value::String(id));
                }
                Ok(None) => errors.push(RowError::new(
                    &rule.target_field,
                    format!("no {} matches \"{raw}\"", target_label(*target)),
                )),
                Err(e) => errors.push(RowError::new(&rule.target_field, e.to_string())),
            },
            Transform::SplitName => {
                let mut parts = raw.split_whitespace();
                if let Some(first) = parts.next() {
                    fields.insert("first_name".into(), Value::String(first.to_string()));
                    let rest = parts.collect::<Vec<_>>().join(" ");
                    if !rest.is_empty() {
                        fields.insert("last_name".into(), Value::String(rest));
                    }
                }
            }
            Transform::Formula { .. } => unreachable!("handled above"),
        }
    }

    (fields, errors)
}

fn target_label(target: LookupTarget) -> &'static str {
    match target {
        LookupTarget::Expert => "expert",
        LookupTarget::Apporteur => "apporteur",
        LookupTarget::Product => "product",
    }
}

async fn resolve_lookup(
    store: &Arc<dyn Store>,
    target: LookupTarget,
    needle: &str,
) -> Result<Option<String>, crate::error::DatabaseError> {
    match target {
        LookupTarget::Expert => Ok(store
            .find_profile_fuzzy(Role::Expert, needle)
            .await?
            .map(|p| p.id.to_string())),
        LookupTarget::Apporteur => Ok(store
            .find_profile_fuzzy(Role::Apporteur, needle)
            .await?
            .map(|p| p.id.to_string())),
        LookupTarget::Product => Ok(store
            .find_product_by_id_or_name(needle)
            .await?
            .map(|p| p.id.to_string())),
    }
}

// ── Scalar transforms ───────────────────────────────────────────────

/// Reparse a date from the configured input pattern into ISO 8601.
fn reparse_date(raw: &str, input_format: &str) -> Result<String, String> {
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw.trim(), input_format) {
        return Ok(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw.trim(), input_format) {
        return Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    Err(format!("\"{raw}\" does not match pattern {input_format}"))
}

/// Strip a phone number to digits, optionally swapping a leading zero
/// for a country-code prefix.
fn normalize_phone(raw: &str, country_prefix: Option<&str>) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match country_prefix {
        Some(prefix) => {
            let national = digits.strip_prefix('0').unwrap_or(&digits);
            format!("{prefix}{national}")
        }
        None => digits,
    }
}

/// Parse a number with configurable decimal/thousands separators.
fn parse_localized_number(
    raw: &str,
    decimal_separator: char,
    thousands_separator: Option<char>,
) -> Result<Decimal, String> {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if Some(c) == thousands_separator || c == ' ' || c == '\u{a0}' {
            continue;
        }
        if c == decimal_separator {
            cleaned.push('.');
        } else {
            cleaned.push(c);
        }
    }
    Decimal::from_str(&cleaned).map_err(|_| format!("\"{raw}\" is not a number"))
}

// ── Formula evaluation ──────────────────────────────────────────────

/// Evaluate a restricted arithmetic expression (`+ - * /`, parens)
/// after substituting `{field}` references with transformed values.
fn eval_formula(expression: &str, fields: &Map<String, Value>) -> Result<f64, String> {
    let substituted = substitute_fields(expression, fields)?;
    let tokens = tokenize(&substituted)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing tokens in formula".into());
    }
    Ok(value)
}

fn substitute_fields(expression: &str, fields: &Map<String, Value>) -> Result<String, String> {
    let mut out = String::with_capacity(expression.len());
    let mut rest = expression;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| "unterminated field reference".to_string())?;
        let name = &after[..end];
        let value = fields
            .get(name)
            .ok_or_else(|| format!("formula references unknown field {{{name}}}"))?;
        let number = match value {
            Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("field {{{name}}} is not numeric"))?,
            _ => return Err(format!("field {{{name}}} is not numeric")),
        };
        out.push_str(&number.to_string());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("bad number literal: {literal}"))?;
                tokens.push(Token::Number(number));
            }
            other => return Err(format!("unexpected character in formula: {other}")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Token::Minus => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Token::Slash => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err("division by zero".into());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err("missing closing parenthesis".into()),
                }
            }
            _ => Err("expected a number".into()),
        }
    }
}
