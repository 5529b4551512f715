// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::value::{Record, Value, format_number};
use anyhow::{Result, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field(String),
}

/// Row text template with `#{field}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut pieces = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("#{") {
            if start > 0 {
                pieces.push(Piece::Literal(rest[..start].to_owned()));
            }
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                bail!("unterminated placeholder in row template {source:?}");
            };
            let field = after[..end].trim();
            if field.is_empty() {
                bail!("empty placeholder in row template {source:?}");
            }
            pieces.push(Piece::Field(field.to_owned()));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Literal(rest.to_owned()));
        }
        Ok(Self {
            source: source.to_owned(),
            pieces,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.pieces.iter().filter_map(|piece| match piece {
            Piece::Field(field) => Some(field.as_str()),
            Piece::Literal(_) => None,
        })
    }

    /// Missing fields render as empty text.
    pub fn render(&self, record: &Record) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field(field) => {
                    if let Some(value) = record.get(field) {
                        push_value(&mut out, value);
                    }
                }
            }
        }
        out
    }
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null | Value::Map(_) => {}
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&format_number(*number)),
        Value::Text(text) => out.push_str(text),
        Value::List(items) => {
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(' ');
                }
                push_value(out, item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Template;
    use crate::{Record, Value};

    #[test]
    fn renders_fields_and_literals() -> anyhow::Result<()> {
        let template = Template::parse("#{from} | #{subject} (#{size})")?;
        let record = Record::from([
            ("from".to_owned(), Value::text("Avery")),
            ("subject".to_owned(), Value::text("Lunch")),
            ("size".to_owned(), Value::Number(42.0)),
        ]);
        assert_eq!(template.render(&record), "Avery | Lunch (42)");
        assert_eq!(
            template.fields().collect::<Vec<_>>(),
            vec!["from", "subject", "size"]
        );
        Ok(())
    }

    #[test]
    fn missing_fields_render_empty() -> anyhow::Result<()> {
        let template = Template::parse("[#{flag}]#{subject}")?;
        let record = Record::from([("subject".to_owned(), Value::text("hi"))]);
        assert_eq!(template.render(&record), "[]hi");
        Ok(())
    }

    #[test]
    fn rejects_broken_placeholders() {
        let error = Template::parse("#{subject").expect_err("unterminated");
        assert!(error.to_string().contains("unterminated"));
        let error = Template::parse("#{ }").expect_err("empty");
        assert!(error.to_string().contains("empty placeholder"));
    }
}
