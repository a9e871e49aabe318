use chumsky::prelude::*;
use serde_json::{Map, Number, Value};

/// Parser for the Python-literal subset GYP files are written in: dicts,
/// lists, tuples, single/double-quoted strings (adjacent literals are
/// concatenated), integers, `True`/`False`/`None` and `#` comments.
pub(crate) fn parser() -> impl Parser<char, Value, Error = Simple<char>> {
    let comment = just('#')
        .then(filter(|c: &char| *c != '\n').repeated())
        .ignored();
    let ws = comment
        .or(filter(|c: &char| c.is_whitespace()).ignored())
        .repeated()
        .ignored();

    let escape = just('\\').ignore_then(any()).map(|c: char| match c {
        'n' => "\n".to_string(),
        't' => "\t".to_string(),
        'r' => "\r".to_string(),
        '\\' | '\'' | '"' => c.to_string(),
        // line continuation
        '\n' => String::new(),
        // python keeps unknown escapes verbatim
        other => format!("\\{other}"),
    });
    let quoted = |quote: char| {
        just(quote)
            .ignore_then(
                filter(move |c: &char| *c != quote && *c != '\\' && *c != '\n')
                    .map(|c: char| c.to_string())
                    .or(escape.clone())
                    .repeated(),
            )
            .then_ignore(just(quote))
            .map(|parts: Vec<String>| parts.concat())
    };
    let literal = quoted('\'').or(quoted('"'));
    let string = literal
        .clone()
        .then(ws.clone().ignore_then(literal).repeated())
        .map(|(first, rest)| {
            let mut s = first;
            s.extend(rest);
            s
        });

    let number = just('-')
        .or_not()
        .then(text::int(10))
        .try_map(|(sign, digits): (Option<char>, String), span| {
            let raw = if sign.is_some() {
                format!("-{digits}")
            } else {
                digits
            };
            raw.parse::<i64>()
                .map(|n| Value::Number(Number::from(n)))
                .map_err(|_| Simple::custom(span, "invalid integer literal"))
        });

    let keyword = text::ident().try_map(|word: String, span| match word.as_str() {
        "True" => Ok(Value::Bool(true)),
        "False" => Ok(Value::Bool(false)),
        "None" => Ok(Value::Null),
        _ => Err(Simple::custom(span, format!("unexpected identifier `{word}`"))),
    });

    let value = recursive(|value| {
        let items = |open: char, close: char| {
            value
                .clone()
                .padded_by(ws.clone())
                .separated_by(just(','))
                .allow_trailing()
                .padded_by(ws.clone())
                .delimited_by(just(open), just(close))
                .map(Value::Array)
        };

        let entry = string
            .clone()
            .padded_by(ws.clone())
            .then_ignore(just(':'))
            .then(value.clone().padded_by(ws.clone()));
        let dict = entry
            .separated_by(just(','))
            .allow_trailing()
            .padded_by(ws.clone())
            .delimited_by(just('{'), just('}'))
            .map(|entries: Vec<(String, Value)>| {
                Value::Object(entries.into_iter().collect::<Map<_, _>>())
            });

        choice((
            dict,
            items('[', ']'),
            items('(', ')'),
            string.clone().map(Value::String),
            number,
            keyword,
        ))
    });

    value.padded_by(ws).then_ignore(end())
}
