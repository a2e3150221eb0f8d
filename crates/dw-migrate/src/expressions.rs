//! Legacy computed columns to `{name, expr}` expressions

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

static CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*$").expect("valid regex"));

/// Prefix of an aliased expression string: `//name\nexpr`
static ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^//([^\n]*)\n([\s\S]*)$").expect("valid regex"));

/// One argument of a legacy computed-column call
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Column(String),
    Number(String),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
struct Call {
    function: String,
    args: Vec<Arg>,
}

impl Call {
    fn parse(input: &str) -> Option<Call> {
        let captures = CALL.captures(input)?;
        let function = captures[1].to_string();
        let args = split_args(&captures[2])?
            .into_iter()
            .filter(|arg| !arg.is_empty())
            .map(|arg| parse_arg(&arg))
            .collect();
        Some(Call { function, args })
    }

    /// Render in current expression syntax, `None` if any function is unknown
    fn translate(&self) -> Option<String> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| match arg {
                Arg::Column(name) => Some(format!("\"{}\"", name)),
                Arg::Number(n) => Some(n.clone()),
                Arg::Call(call) => call.translate().map(|expr| {
                    if is_infix(&call.function) {
                        format!("({})", expr)
                    } else {
                        expr
                    }
                }),
            })
            .collect::<Option<_>>()?;

        let template = function_template(&self.function, args.len())?;
        Some(fill(template, &args))
    }

    /// Unquoted call form, e.g. `month_bucket(Order Date)`
    fn plain_name(&self, separator: &str) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| match arg {
                Arg::Column(name) | Arg::Number(name) => name.clone(),
                Arg::Call(call) => call.plain_name(separator),
            })
            .collect();
        format!("{}({})", self.function, args.join(separator))
    }

    /// Names under which legacy configs referenced this column
    fn legacy_names(&self, raw: &str) -> Vec<String> {
        let mut names = vec![raw.trim().to_string(), self.plain_name(", "), self.plain_name(",")];
        names.retain(|name| !name.is_empty());
        names.dedup();
        names
    }
}

fn parse_arg(arg: &str) -> Arg {
    let arg = arg.trim();
    if let Some(inner) = arg.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
        return Arg::Column(inner.to_string());
    }
    if let Some(inner) = arg.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')) {
        return Arg::Column(inner.to_string());
    }
    if arg.parse::<f64>().is_ok() {
        return Arg::Number(arg.to_string());
    }
    match Call::parse(arg) {
        Some(call) if function_template(&call.function, call.args.len()).is_some() => Arg::Call(call),
        _ => Arg::Column(arg.to_string()),
    }
}

/// Split on top-level commas, honoring quotes and parentheses
fn split_args(input: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') => {
                depth = depth.checked_sub(1)?;
                current.push(c);
            }
            (None, ',') if depth == 0 => args.push(std::mem::take(&mut current).trim().to_string()),
            (None, c) => current.push(c),
        }
    }

    if quote.is_some() || depth != 0 {
        return None;
    }
    args.push(current.trim().to_string());
    Some(args)
}

fn is_infix(function: &str) -> bool {
    matches!(
        function,
        "add" | "subtract" | "multiply" | "divide" | "percent_of" | "invert" | "equals" | "not_equals"
            | "greater_than" | "less_than"
    )
}

fn function_template(function: &str, arity: usize) -> Option<&'static str> {
    let template = match (function, arity) {
        ("second_bucket", 1) => "bucket({0}, 's')",
        ("minute_bucket", 1) => "bucket({0}, 'm')",
        ("hour_bucket", 1) => "bucket({0}, 'h')",
        ("day_bucket", 1) => "bucket({0}, 'D')",
        ("week_bucket", 1) => "bucket({0}, 'W')",
        ("month_bucket", 1) => "bucket({0}, 'M')",
        ("year_bucket", 1) => "bucket({0}, 'Y')",
        ("day_of_week", 1) => "day_of_week({0})",
        ("month_of_year", 1) => "month_of_year({0})",
        ("uppercase", 1) => "upper({0})",
        ("lowercase", 1) => "lower({0})",
        ("length", 1) => "length({0})",
        ("abs", 1) => "abs({0})",
        ("sqrt", 1) => "sqrt({0})",
        ("log", 1) => "log({0})",
        ("exp", 1) => "exp({0})",
        ("pow2", 1) => "pow({0}, 2)",
        ("invert", 1) => "1 / {0}",
        ("add", 2) => "{0} + {1}",
        ("subtract", 2) => "{0} - {1}",
        ("multiply", 2) => "{0} * {1}",
        ("divide", 2) => "{0} / {1}",
        ("percent_of", 2) => "({0} / {1}) * 100",
        ("equals", 2) => "{0} == {1}",
        ("not_equals", 2) => "{0} != {1}",
        ("greater_than", 2) => "{0} > {1}",
        ("less_than", 2) => "{0} < {1}",
        ("concat_space", 2) => "concat({0}, ' ', {1})",
        ("concat_comma", 2) => "concat({0}, ', ', {1})",
        _ => return None,
    };
    Some(template)
}

fn fill(template: &str, args: &[String]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |acc, (i, arg)| acc.replace(&format!("{{{}}}", i), arg))
}

/// Translate a legacy computed-column string, returning the canonical
/// expression and the names it was referenced by
fn translate_computed(raw: &str) -> Option<(String, Vec<String>)> {
    let call = Call::parse(raw)?;
    let expr = call.translate()?;
    Some((expr, call.legacy_names(raw)))
}

/// Translate the object form `{column, computed_function_name, inputs}`
fn translate_computed_object(object: &Map<String, Value>) -> Option<(String, Vec<String>)> {
    let function = object.get("computed_function_name")?.as_str()?;
    let inputs: Vec<Arg> = object
        .get("inputs")?
        .as_array()?
        .iter()
        .map(|input| input.as_str().map(|s| Arg::Column(s.to_string())))
        .collect::<Option<_>>()?;

    let call = Call {
        function: function.to_string(),
        args: inputs,
    };
    let expr = call.translate()?;
    let mut names = call.legacy_names("");
    if let Some(column) = object.get("column").and_then(Value::as_str) {
        names.insert(0, column.to_string());
    }
    Some((expr, names))
}

/// Split an aliased expression string into `(name, expr)`
fn split_alias(expr: &str) -> (String, String) {
    match ALIAS.captures(expr) {
        Some(captures) => (captures[1].trim().to_string(), captures[2].to_string()),
        None => (expr.to_string(), expr.to_string()),
    }
}

fn entry(name: String, expr: String) -> Value {
    json!({ "name": name, "expr": expr })
}

/// Migration step: computed columns and string expressions become a list
/// of `{name, expr}` entries, and references are rewritten to the canonical
/// expression name
pub(crate) fn migrate(mut config: Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<Value> = Vec::new();
    let mut renames: HashMap<String, String> = HashMap::new();

    let mut had_list = false;
    match config.remove("expressions") {
        Some(Value::Array(items)) => {
            had_list = true;
            for item in items {
                match item {
                    Value::String(expr) => {
                        let (name, expr) = split_alias(&expr);
                        entries.push(entry(name, expr));
                    }
                    other => entries.push(other),
                }
            }
        }
        Some(Value::Object(map)) => {
            had_list = true;
            for (name, expr) in map {
                match expr {
                    Value::String(expr) => entries.push(entry(name, expr)),
                    other => entries.push(json!({ "name": name, "expr": other })),
                }
            }
        }
        Some(other) => {
            config.insert("expressions".into(), other);
        }
        None => {}
    }

    match config.remove("computed_columns") {
        Some(Value::Array(items)) => {
            let mut kept = Vec::new();
            for item in items {
                let translated = match &item {
                    Value::String(raw) => translate_computed(raw),
                    Value::Object(object) => translate_computed_object(object),
                    _ => None,
                };

                match (translated, item) {
                    (Some((expr, names)), _) => {
                        for name in names {
                            renames.insert(name, expr.clone());
                        }
                        entries.push(entry(expr.clone(), expr));
                    }
                    (None, Value::String(raw)) => {
                        tracing::debug!(computed = %raw, "unrecognized computed column kept verbatim");
                        entries.push(entry(raw.clone(), raw));
                    }
                    (None, other) => {
                        tracing::debug!(computed = %other, "unrecognized computed column left in place");
                        kept.push(other);
                    }
                }
            }
            if !kept.is_empty() {
                config.insert("computed_columns".into(), Value::Array(kept));
            }
        }
        Some(Value::Object(map)) => {
            let mut kept = Map::new();
            for (name, value) in map {
                match value {
                    Value::String(raw) => {
                        let expr = match translate_computed(&raw) {
                            Some((expr, names)) => {
                                for legacy in names.into_iter().filter(|legacy| *legacy != name) {
                                    renames.insert(legacy, name.clone());
                                }
                                expr
                            }
                            None => raw,
                        };
                        entries.push(entry(name, expr));
                    }
                    other => {
                        kept.insert(name, other);
                    }
                }
            }
            if !kept.is_empty() {
                config.insert("computed_columns".into(), Value::Object(kept));
            }
        }
        Some(other) => {
            config.insert("computed_columns".into(), other);
        }
        None => {}
    }

    if had_list || (!entries.is_empty() && !config.contains_key("expressions")) {
        dedup_by_name(&mut entries);
        config.insert("expressions".into(), Value::Array(entries));
    }

    if !renames.is_empty() {
        rewrite_references(&mut config, &renames);
    }

    config
}

fn dedup_by_name(entries: &mut Vec<Value>) {
    let mut seen = std::collections::HashSet::new();
    entries.retain(|entry| match entry.get("name").and_then(Value::as_str) {
        Some(name) => seen.insert(name.to_string()),
        None => true,
    });
}

fn rewrite_references(config: &mut Map<String, Value>, renames: &HashMap<String, String>) {
    let rename = |value: &mut Value| {
        if let Some(new) = value.as_str().and_then(|s| renames.get(s)) {
            *value = Value::String(new.clone());
        }
    };

    for key in ["group_by", "split_by", "columns"] {
        if let Some(Value::Array(items)) = config.get_mut(key) {
            items.iter_mut().for_each(rename);
        }
    }

    for key in ["sort", "filter"] {
        if let Some(Value::Array(items)) = config.get_mut(key) {
            for item in items.iter_mut() {
                if let Some(first) = item.as_array_mut().and_then(|clause| clause.first_mut()) {
                    rename(first);
                }
            }
        }
    }

    if let Some(Value::Object(aggregates)) = config.get_mut("aggregates") {
        let renamed: Map<String, Value> = std::mem::take(aggregates)
            .into_iter()
            .map(|(column, aggregate)| (renames.get(&column).cloned().unwrap_or(column), aggregate))
            .collect();
        *aggregates = renamed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_translate_bucket() {
        let (expr, names) = translate_computed("month_bucket(\"Order Date\")").unwrap();
        assert_eq!(expr, "bucket(\"Order Date\", 'M')");
        assert!(names.contains(&"month_bucket(Order Date)".to_string()));
    }

    #[test]
    fn test_translate_nested_and_binary() {
        let (expr, _) = translate_computed("uppercase(concat_comma(\"City\", \"State\"))").unwrap();
        assert_eq!(expr, "upper(concat(\"City\", ', ', \"State\"))");

        let (expr, _) = translate_computed("multiply(add(\"Sales\", \"Profit\"), \"Quantity\")").unwrap();
        assert_eq!(expr, "(\"Sales\" + \"Profit\") * \"Quantity\"");
    }

    #[test]
    fn test_unknown_function_is_kept() {
        assert!(translate_computed("frobnicate(\"Sales\")").is_none());
        let config = migrate(object(json!({"computed_columns": ["frobnicate(\"Sales\")"]})));
        assert_eq!(
            config["expressions"],
            json!([{"name": "frobnicate(\"Sales\")", "expr": "frobnicate(\"Sales\")"}])
        );
    }

    #[test]
    fn test_aliased_string_expressions() {
        let config = migrate(object(json!({"expressions": ["//Margin\n\"Profit\" / \"Sales\"", "\"Sales\" + 1"]})));
        assert_eq!(
            config["expressions"],
            json!([
                {"name": "Margin", "expr": "\"Profit\" / \"Sales\""},
                {"name": "\"Sales\" + 1", "expr": "\"Sales\" + 1"},
            ])
        );
    }

    #[test]
    fn test_expression_map_becomes_list() {
        let config = migrate(object(json!({"expressions": {"Double": "\"Sales\" * 2"}})));
        assert_eq!(config["expressions"], json!([{"name": "Double", "expr": "\"Sales\" * 2"}]));
    }

    #[test]
    fn test_object_form_and_reference_rewrite() {
        let config = migrate(object(json!({
            "group_by": ["day_bucket(Ship Date)"],
            "sort": [["day_bucket(Ship Date)", "desc"]],
            "aggregates": {"day_bucket(Ship Date)": "dominant"},
            "computed_columns": [{
                "column": "day_bucket(Ship Date)",
                "computed_function_name": "day_bucket",
                "inputs": ["Ship Date"],
            }],
        })));

        let canonical = "bucket(\"Ship Date\", 'D')";
        assert_eq!(config["group_by"], json!([canonical]));
        assert_eq!(config["sort"], json!([[canonical, "desc"]]));
        let mut aggregates = Map::new();
        aggregates.insert(canonical.to_string(), json!("dominant"));
        assert_eq!(config["aggregates"], Value::Object(aggregates));
        assert!(!config.contains_key("computed_columns"));
    }

    #[test]
    fn test_split_args_respects_quotes() {
        let args = split_args("\"a, b\", f(\"c\", \"d\")").unwrap();
        assert_eq!(args, vec!["\"a, b\"".to_string(), "f(\"c\", \"d\")".to_string()]);
        assert!(split_args("\"unterminated").is_none());
    }

    #[test]
    fn test_unrecognized_computed_object_stays_in_place() {
        let unknown = json!({
            "column": "frobnicate(Sales)",
            "computed_function_name": "frobnicate",
            "inputs": ["Sales"],
        });
        let config = migrate(object(json!({
            "computed_columns": [unknown.clone(), "month_bucket(\"Order Date\")"],
        })));

        assert_eq!(config["computed_columns"], json!([unknown]));
        assert_eq!(
            config["expressions"],
            json!([{"name": "bucket(\"Order Date\", 'M')", "expr": "bucket(\"Order Date\", 'M')"}])
        );
    }

    #[test]
    fn test_computed_column_map_becomes_named_expressions() {
        let config = migrate(object(json!({
            "group_by": ["divide(Profit, Sales)"],
            "computed_columns": {"Margin": "divide(\"Profit\", \"Sales\")", "Raw": "frobnicate(\"Sales\")"},
        })));

        assert_eq!(
            config["expressions"],
            json!([
                {"name": "Margin", "expr": "\"Profit\" / \"Sales\""},
                {"name": "Raw", "expr": "frobnicate(\"Sales\")"},
            ])
        );
        assert_eq!(config["group_by"], json!(["Margin"]));
        assert!(!config.contains_key("computed_columns"));
    }

    #[test]
    fn test_non_list_computed_columns_pass_through() {
        let config = migrate(object(json!({"computed_columns": "month_bucket(\"Order Date\")"})));
        assert_eq!(config["computed_columns"], json!("month_bucket(\"Order Date\")"));
        assert!(!config.contains_key("expressions"));

        let config = migrate(object(json!({"computed_columns": {"Odd": 3}})));
        assert_eq!(config["computed_columns"], json!({"Odd": 3}));
    }
}
