//! Config decoding for `.agent-layer/config.toml`.
//!
//! Two decoders exist on purpose: the loose decoder (`toml::Value`) keeps
//! every key a user wrote so migrations never drop content, and the strict
//! decoder names the keys the engine understands so the readiness checker can
//! report the rest.

use std::collections::BTreeMap;

use serde::Deserialize;
use toml::Value;

/// Strictly-decoded config. Unknown keys are not an error here; they are
/// detected by walking the loose tree against the known-key table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrictConfig {
    #[serde(default)]
    pub schema_version: Option<i64>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub tools: Option<ToolsConfig>,
    #[serde(default)]
    pub dependencies: Option<DependenciesConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub enabled: bool,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(default)]
    pub allow_extra: Vec<String>,
    #[serde(default)]
    pub extra_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependenciesConfig {
    #[serde(default)]
    pub external: Vec<String>,
}

/// Parse config bytes with the loose decoder.
pub fn parse_loose(bytes: &[u8]) -> Result<Value, String> {
    let content = String::from_utf8_lossy(bytes);
    content.parse::<Value>().map_err(|err| err.to_string())
}

/// Parse config bytes with the strict decoder. Unknown keys make this fail;
/// callers that only need the recognized subset should pair it with
/// [`unrecognized_keys`] on the loose tree instead.
pub fn parse_strict(bytes: &[u8]) -> Result<StrictConfig, String> {
    let content = String::from_utf8_lossy(bytes);
    toml::from_str(&content).map_err(|err| err.to_string())
}

/// Decode the recognized subset of a loose tree, ignoring unknown keys.
pub fn recognized_subset(value: &Value) -> StrictConfig {
    let mut config = StrictConfig::default();
    let Some(table) = value.as_table() else {
        return config;
    };

    if let Some(version) = table.get("schema_version").and_then(Value::as_integer) {
        config.schema_version = Some(version);
    }
    if let Some(agents) = table.get("agents").and_then(Value::as_table) {
        for (name, agent) in agents {
            let Some(agent) = agent.as_table() else { continue };
            let enabled = agent.get("enabled").and_then(Value::as_bool).unwrap_or(false);
            let output =
                agent.get("output").and_then(Value::as_str).map(str::to_string);
            config.agents.insert(name.clone(), AgentConfig { enabled, output });
        }
    }
    if let Some(tools) = table.get("tools").and_then(Value::as_table) {
        config.tools = Some(ToolsConfig {
            allow_extra: string_array(tools.get("allow_extra")),
            extra_paths: string_array(tools.get("extra_paths")),
        });
    }
    if let Some(dependencies) = table.get("dependencies").and_then(Value::as_table) {
        config.dependencies =
            Some(DependenciesConfig { external: string_array(dependencies.get("external")) });
    }
    config
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect()
        })
        .unwrap_or_default()
}

/// Dotted paths of keys the strict decoder does not understand.
pub fn unrecognized_keys(value: &Value) -> Vec<String> {
    let mut unknown = Vec::new();
    let Some(table) = value.as_table() else {
        return unknown;
    };

    for (key, entry) in table {
        match key.as_str() {
            "schema_version" => {}
            "agents" => {
                if let Some(agents) = entry.as_table() {
                    for (agent, fields) in agents {
                        if let Some(fields) = fields.as_table() {
                            for field in fields.keys() {
                                if field != "enabled" && field != "output" {
                                    unknown.push(format!("agents.{agent}.{field}"));
                                }
                            }
                        }
                    }
                }
            }
            "tools" => {
                if let Some(tools) = entry.as_table() {
                    for field in tools.keys() {
                        if field != "allow_extra" && field != "extra_paths" {
                            unknown.push(format!("tools.{field}"));
                        }
                    }
                }
            }
            "dependencies" => {
                if let Some(dependencies) = entry.as_table() {
                    for field in dependencies.keys() {
                        if field != "external" {
                            unknown.push(format!("dependencies.{field}"));
                        }
                    }
                }
            }
            other => unknown.push(other.to_string()),
        }
    }

    unknown.sort();
    unknown
}

/// All string leaves of the loose tree, as (dotted path, value) pairs.
/// Used by the readiness checker for placeholder and path scans.
pub fn string_values(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_strings(value, String::new(), &mut out);
    out.sort();
    out
}

fn collect_strings(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::String(text) => out.push((prefix, text.clone())),
        Value::Table(table) => {
            for (key, entry) in table {
                let path =
                    if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                collect_strings(entry, path, out);
            }
        }
        Value::Array(items) => {
            for (index, entry) in items.iter().enumerate() {
                collect_strings(entry, format!("{prefix}[{index}]"), out);
            }
        }
        _ => {}
    }
}

/// Look up a key path. `Ok(None)` means a component was absent; an error
/// means traversal hit a non-table intermediate.
pub fn get_key<'v>(root: &'v Value, path: &[String]) -> Result<Option<&'v Value>, String> {
    let mut current = root;
    for (index, component) in path.iter().enumerate() {
        let table = current.as_table().ok_or_else(|| {
            format!("'{}' is not a table", path[..index].join("."))
        })?;
        match table.get(component) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Remove the value at a key path, returning it. `Ok(None)` when absent.
pub fn remove_key(root: &mut Value, path: &[String]) -> Result<Option<Value>, String> {
    let (last, parents) = path.split_last().ok_or("key path is empty")?;
    let mut current = root;
    for (index, component) in parents.iter().enumerate() {
        let table = current.as_table_mut().ok_or_else(|| {
            format!("'{}' is not a table", path[..index].join("."))
        })?;
        match table.get_mut(component) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    let table = current
        .as_table_mut()
        .ok_or_else(|| format!("'{}' is not a table", parents.join(".")))?;
    Ok(table.remove(last))
}

/// Set a key path, creating intermediate tables. Errors when traversal hits a
/// non-table intermediate.
pub fn set_key(root: &mut Value, path: &[String], value: Value) -> Result<(), String> {
    let (last, parents) = path.split_last().ok_or("key path is empty")?;
    let mut current = root;
    for (index, component) in parents.iter().enumerate() {
        let table = current.as_table_mut().ok_or_else(|| {
            format!("'{}' is not a table", path[..index].join("."))
        })?;
        current = table
            .entry(component.clone())
            .or_insert_with(|| Value::Table(toml::map::Map::new()));
    }
    let table = current
        .as_table_mut()
        .ok_or_else(|| format!("'{}' is not a table", parents.join(".")))?;
    table.insert(last.clone(), value);
    Ok(())
}

/// Convert a manifest-supplied JSON default into a TOML value. Null has no
/// TOML counterpart and is rejected.
pub fn json_to_toml(value: &serde_json::Value) -> Result<Value, String> {
    match value {
        serde_json::Value::Null => Err("null is not representable in TOML".to_string()),
        serde_json::Value::Bool(flag) => Ok(Value::Boolean(*flag)),
        serde_json::Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Ok(Value::Integer(integer))
            } else if let Some(float) = number.as_f64() {
                Ok(Value::Float(float))
            } else {
                Err(format!("number '{number}' is out of range"))
            }
        }
        serde_json::Value::String(text) => Ok(Value::String(text.clone())),
        serde_json::Value::Array(items) => {
            let converted: Result<Vec<Value>, String> =
                items.iter().map(json_to_toml).collect();
            Ok(Value::Array(converted?))
        }
        serde_json::Value::Object(map) => {
            let mut table = toml::map::Map::new();
            for (key, entry) in map {
                table.insert(key.clone(), json_to_toml(entry)?);
            }
            Ok(Value::Table(table))
        }
    }
}

/// Serialize a loose config tree back to TOML with a trailing newline.
pub fn serialize_config(value: &Value) -> Result<String, String> {
    let mut rendered = toml::to_string(value).map_err(|err| err.to_string())?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
schema_version = 1

[agents.vscode]
enabled = true
output = "tasks"

[tools]
allow_extra = ["${EXTRA_TOOL}"]

[dependencies]
external = ["markdownlint@0.39.0"]
"#;

    #[test]
    fn strict_and_loose_decoders_agree_on_valid_config() {
        let loose = parse_loose(SAMPLE.as_bytes()).unwrap();
        let strict = parse_strict(SAMPLE.as_bytes()).unwrap();
        assert_eq!(strict.schema_version, Some(1));
        assert!(strict.agents["vscode"].enabled);
        assert!(unrecognized_keys(&loose).is_empty());
    }

    #[test]
    fn unknown_keys_are_reported_with_dotted_paths() {
        let content = r#"
schema_version = 1
surprise = "x"

[agents.vscode]
enabled = true
color = "red"

[tools]
allow_extra = []
verbose = true
"#;
        let loose = parse_loose(content.as_bytes()).unwrap();
        assert_eq!(
            unrecognized_keys(&loose),
            vec![
                "agents.vscode.color".to_string(),
                "surprise".to_string(),
                "tools.verbose".to_string()
            ]
        );
        assert!(parse_strict(content.as_bytes()).is_err());
    }

    #[test]
    fn key_path_lookup_and_removal() {
        let mut loose = parse_loose(SAMPLE.as_bytes()).unwrap();
        let path = vec!["agents".to_string(), "vscode".to_string(), "enabled".to_string()];
        assert_eq!(get_key(&loose, &path).unwrap(), Some(&Value::Boolean(true)));

        let removed = remove_key(&mut loose, &path).unwrap();
        assert_eq!(removed, Some(Value::Boolean(true)));
        assert_eq!(get_key(&loose, &path).unwrap(), None);
    }

    #[test]
    fn traversal_through_non_table_errors() {
        let loose = parse_loose(b"schema_version = 1\n").unwrap();
        let path = vec!["schema_version".to_string(), "nested".to_string()];
        assert!(get_key(&loose, &path).is_err());
    }

    #[test]
    fn set_key_creates_intermediate_tables() {
        let mut loose = parse_loose(b"schema_version = 1\n").unwrap();
        let path = vec!["agents".to_string(), "zed".to_string(), "enabled".to_string()];
        set_key(&mut loose, &path, Value::Boolean(false)).unwrap();
        assert_eq!(get_key(&loose, &path).unwrap(), Some(&Value::Boolean(false)));
    }

    #[test]
    fn json_defaults_convert_to_toml() {
        assert_eq!(json_to_toml(&serde_json::json!(1)).unwrap(), Value::Integer(1));
        assert_eq!(
            json_to_toml(&serde_json::json!(["a", "b"])).unwrap(),
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())])
        );
        assert!(json_to_toml(&serde_json::Value::Null).is_err());
    }

    #[test]
    fn serialized_config_ends_with_newline() {
        let loose = parse_loose(b"schema_version = 1").unwrap();
        let rendered = serialize_config(&loose).unwrap();
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn string_values_walks_tables_and_arrays() {
        let loose = parse_loose(SAMPLE.as_bytes()).unwrap();
        let values = string_values(&loose);
        assert!(values.contains(&("tools.allow_extra[0]".to_string(), "${EXTRA_TOOL}".to_string())));
        assert!(values.contains(&("agents.vscode.output".to_string(), "tasks".to_string())));
    }
}
