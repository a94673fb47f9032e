//! Parser for the textual type signatures the coordinator attaches to result
//! columns, e.g. `array(map(varchar,bigint))` or `row("a" bigint,"b" varchar)`.

use std::fmt;

use crate::error::ClientError;

/// A parsed type signature: a base name plus optional parameters.
///
/// Bases may contain spaces (`time with time zone`, `interval year to month`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSignature {
    base: String,
    parameters: Vec<TypeSignatureParameter>,
}

/// One parameter of a parameterized type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignatureParameter {
    /// A nested type, as in `array(bigint)`.
    Type(TypeSignature),
    /// A named field of a `row` type, as in `row("a" bigint)`.
    NamedType {
        name: String,
        signature: TypeSignature,
    },
    /// A numeric literal, as in `varchar(10)` or `decimal(38,2)`.
    Long(i64),
    /// An identifier parameter, as in `decimal(p,s)`.
    Variable(String),
}

impl TypeSignature {
    pub fn new(base: impl Into<String>, parameters: Vec<TypeSignatureParameter>) -> Self {
        Self {
            base: base.into(),
            parameters,
        }
    }

    pub fn scalar(base: impl Into<String>) -> Self {
        Self::new(base, Vec::new())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn parameters(&self) -> &[TypeSignatureParameter] {
        &self.parameters
    }

    /// The nested type signatures of the `Type` parameters, in order.
    pub fn type_parameters(&self) -> Vec<&TypeSignature> {
        self.parameters
            .iter()
            .filter_map(|parameter| match parameter {
                TypeSignatureParameter::Type(signature) => Some(signature),
                _ => None,
            })
            .collect()
    }

    /// Parses a type signature string.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        parse_signature(text, text)
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;
        if !self.parameters.is_empty() {
            f.write_str("(")?;
            for (i, parameter) in self.parameters.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{parameter}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeSignatureParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignatureParameter::Type(signature) => write!(f, "{signature}"),
            TypeSignatureParameter::NamedType { name, signature } => {
                write!(f, "\"{name}\" {signature}")
            }
            TypeSignatureParameter::Long(value) => write!(f, "{value}"),
            TypeSignatureParameter::Variable(name) => f.write_str(name),
        }
    }
}

fn invalid(signature: &str, message: impl Into<String>) -> ClientError {
    ClientError::InvalidTypeSignature {
        signature: signature.to_string(),
        message: message.into(),
    }
}

fn parse_signature(text: &str, full: &str) -> Result<TypeSignature, ClientError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid(full, "empty type signature"));
    }

    let open = match text.find('(') {
        None => {
            validate_base(text, full)?;
            return Ok(TypeSignature::scalar(text));
        }
        Some(open) => open,
    };

    let close =
        find_matching_paren(text, open).ok_or_else(|| invalid(full, "unbalanced parentheses"))?;
    if close != text.len() - 1 {
        return Err(invalid(full, "unexpected characters after parameter list"));
    }

    let base = text[..open].trim();
    validate_base(base, full)?;

    let parameters = split_top_level(&text[open + 1..close], full)?
        .into_iter()
        .map(|part| parse_parameter(base, part, full))
        .collect::<Result<Vec<_>, _>>()?;
    if parameters.is_empty() {
        return Err(invalid(full, "empty parameter list"));
    }
    check_parameter_kinds(base, &parameters, full)?;

    Ok(TypeSignature::new(base, parameters))
}

fn validate_base(base: &str, full: &str) -> Result<(), ClientError> {
    if base.is_empty() {
        return Err(invalid(full, "missing base type name"));
    }
    if let Some(bad) = base.chars().find(|c| matches!(c, ')' | ',' | '"')) {
        return Err(invalid(full, format!("unexpected character '{bad}'")));
    }
    Ok(())
}

/// Index of the `)` matching the `(` at `open`, honoring quoted field names.
fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a parameter list on commas that are not nested in parentheses or
/// quoted names.
fn split_top_level<'a>(text: &'a str, full: &str) -> Result<Vec<&'a str>, ClientError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(full, "unbalanced parentheses"))?;
            }
            ',' if !in_quotes && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || in_quotes {
        return Err(invalid(full, "unbalanced parentheses"));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn parse_parameter(
    base: &str,
    text: &str,
    full: &str,
) -> Result<TypeSignatureParameter, ClientError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid(full, "empty type parameter"));
    }

    match base {
        "row" => {
            let rest = text
                .strip_prefix('"')
                .ok_or_else(|| invalid(full, "row field must have a quoted name"))?;
            let end = rest
                .find('"')
                .ok_or_else(|| invalid(full, "unterminated row field name"))?;
            let name = &rest[..end];
            let signature_text = rest[end + 1..].trim();
            if signature_text.is_empty() {
                return Err(invalid(full, format!("missing type for row field \"{name}\"")));
            }
            Ok(TypeSignatureParameter::NamedType {
                name: name.to_string(),
                signature: parse_signature(signature_text, full)?,
            })
        }
        "array" | "map" => Ok(TypeSignatureParameter::Type(parse_signature(text, full)?)),
        "varchar" | "char" | "decimal" => {
            if text.bytes().all(|b| b.is_ascii_digit()) {
                let value = text
                    .parse::<i64>()
                    .map_err(|_| invalid(full, format!("numeric parameter '{text}' out of range")))?;
                Ok(TypeSignatureParameter::Long(value))
            } else if text
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                Ok(TypeSignatureParameter::Variable(text.to_string()))
            } else {
                Err(invalid(full, format!("invalid parameter '{text}' for {base}")))
            }
        }
        _ => {
            if text.bytes().all(|b| b.is_ascii_digit()) {
                let value = text
                    .parse::<i64>()
                    .map_err(|_| invalid(full, format!("numeric parameter '{text}' out of range")))?;
                Ok(TypeSignatureParameter::Long(value))
            } else {
                Ok(TypeSignatureParameter::Type(parse_signature(text, full)?))
            }
        }
    }
}

fn check_parameter_kinds(
    base: &str,
    parameters: &[TypeSignatureParameter],
    full: &str,
) -> Result<(), ClientError> {
    match base {
        "array" => {
            if parameters.len() != 1 {
                return Err(invalid(full, "array takes exactly one type parameter"));
            }
        }
        "map" => {
            if parameters.len() != 2 {
                return Err(invalid(full, "map takes exactly two type parameters"));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> TypeSignature {
        TypeSignature::parse(text).unwrap()
    }

    #[test]
    fn scalar() {
        let signature = parse("bigint");
        assert_eq!(signature.base(), "bigint");
        assert!(signature.parameters().is_empty());
    }

    #[test]
    fn base_with_spaces() {
        assert_eq!(parse("time with time zone").base(), "time with time zone");
        assert_eq!(
            parse("interval year to month").base(),
            "interval year to month"
        );
    }

    #[test]
    fn nested_array_of_map() {
        let signature = parse("array(map(varchar,bigint))");
        assert_eq!(signature.base(), "array");
        let map = match &signature.parameters()[0] {
            TypeSignatureParameter::Type(inner) => inner,
            other => panic!("unexpected parameter {other:?}"),
        };
        assert_eq!(map.base(), "map");
        assert_eq!(map.type_parameters().len(), 2);
    }

    #[test]
    fn row_fields_are_named() {
        let signature = parse("row(\"a\" bigint,\"b\" array(varchar))");
        assert_eq!(signature.base(), "row");
        match &signature.parameters()[0] {
            TypeSignatureParameter::NamedType { name, signature } => {
                assert_eq!(name, "a");
                assert_eq!(signature.base(), "bigint");
            }
            other => panic!("unexpected parameter {other:?}"),
        }
        match &signature.parameters()[1] {
            TypeSignatureParameter::NamedType { name, signature } => {
                assert_eq!(name, "b");
                assert_eq!(signature.base(), "array");
            }
            other => panic!("unexpected parameter {other:?}"),
        }
    }

    #[test]
    fn literal_parameters() {
        assert_eq!(
            parse("varchar(10)").parameters(),
            &[TypeSignatureParameter::Long(10)]
        );
        assert_eq!(
            parse("decimal(38,2)").parameters(),
            &[
                TypeSignatureParameter::Long(38),
                TypeSignatureParameter::Long(2)
            ]
        );
        assert_eq!(
            parse("decimal(p,s)").parameters(),
            &[
                TypeSignatureParameter::Variable("p".to_string()),
                TypeSignatureParameter::Variable("s".to_string())
            ]
        );
    }

    #[test]
    fn whitespace_between_tokens_is_ignored() {
        let signature = parse("map( varchar , bigint )");
        assert_eq!(signature.to_string(), "map(varchar,bigint)");
    }

    #[test]
    fn round_trips_canonical_text() {
        for text in [
            "bigint",
            "time with time zone",
            "varchar(10)",
            "decimal(38,2)",
            "array(bigint)",
            "map(varchar,array(double))",
            "row(\"a\" bigint,\"b\" map(varchar,bigint))",
            "array(row(\"x\" double,\"y\" double))",
        ] {
            assert_eq!(parse(text).to_string(), text);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        for text in [
            "",
            "array(bigint",
            "array(bigint))",
            "array(bigint)x",
            "array()",
            "array(a,b)",
            "map(varchar)",
            "row(bigint)",
            "row(\"a\")",
            "row(\"a bigint)",
            "varchar(1.5)",
            "(bigint)",
        ] {
            assert!(
                TypeSignature::parse(text).is_err(),
                "expected parse failure for {text:?}"
            );
        }
    }

    #[test]
    fn quoted_names_may_contain_separators() {
        let signature = parse("row(\"a,b\" bigint,\"c(d)\" varchar)");
        match &signature.parameters()[0] {
            TypeSignatureParameter::NamedType { name, .. } => assert_eq!(name, "a,b"),
            other => panic!("unexpected parameter {other:?}"),
        }
        match &signature.parameters()[1] {
            TypeSignatureParameter::NamedType { name, .. } => assert_eq!(name, "c(d)"),
            other => panic!("unexpected parameter {other:?}"),
        }
    }
}
