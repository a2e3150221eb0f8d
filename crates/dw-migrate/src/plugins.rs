//! Legacy plugin identifiers

use serde_json::{Map, Value};

/// Legacy identifier to current plugin name
const PLUGIN_NAMES: &[(&str, &str)] = &[
    ("d3_y_area", "Y Area"),
    ("d3_y_line", "Y Line"),
    ("d3_y_bar", "Y Bar"),
    ("d3_x_bar", "X Bar"),
    ("d3_xy_line", "X/Y Line"),
    ("d3_xy_scatter", "X/Y Scatter"),
    ("d3_y_scatter", "Y Scatter"),
    ("d3_treemap", "Treemap"),
    ("d3_sunburst", "Sunburst"),
    ("d3_heatmap", "Heatmap"),
    ("d3_candlestick", "Candlestick"),
    ("d3_ohlc", "OHLC"),
    ("datagrid", "Datagrid"),
    ("hypergrid", "Datagrid"),
];

/// Current name for a legacy plugin identifier, if it is one
pub fn translate(plugin: &str) -> Option<&'static str> {
    PLUGIN_NAMES
        .iter()
        .find(|(legacy, _)| legacy.eq_ignore_ascii_case(plugin))
        .map(|(_, current)| *current)
}

/// Migration step: rewrite `plugin` through the translation table
pub(crate) fn migrate(mut config: Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::String(plugin)) = config.get_mut("plugin") {
        if let Some(current) = translate(plugin) {
            tracing::debug!(legacy = %plugin, current, "translated plugin name");
            *plugin = current.to_string();
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_plugins() {
        assert_eq!(translate("d3_y_area"), Some("Y Area"));
        assert_eq!(translate("hypergrid"), Some("Datagrid"));
        assert_eq!(translate("Y Area"), None);
    }

    #[test]
    fn test_unknown_plugin_passes_through() {
        let mut config = Map::new();
        config.insert("plugin".into(), json!("my_custom_chart"));
        let config = migrate(config);
        assert_eq!(config["plugin"], json!("my_custom_chart"));
    }
}
