//! Writers for the three on-disk result formats.
//!
//! The plot-data layout (`<key>.properties` holding `YVALUE=<value>`) is read
//! by the CI plotting job and must not change.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::flatten::FlatMap;

/// Render a flattened leaf the way the plot files expect it: strings bare,
/// numbers in their shortest round-trip form. Exponents carry no padding
/// (`5e-5`, not `5e-05`), which plot readers parse as the same float.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// One file per key: `<dst_dir>/<key>.properties` containing `YVALUE=<value>\n`.
pub fn write_plot_properties<P: AsRef<Path>>(data: &FlatMap, dst_dir: P) -> io::Result<()> {
    let dst_dir = dst_dir.as_ref();
    fs::create_dir_all(dst_dir)?;

    for (key, value) in data {
        let path = dst_dir.join(format!("{key}.properties"));
        fs::write(path, format!("YVALUE={}\n", render_value(value)))?;
    }

    info!(
        "wrote {} plot property files to {}",
        data.len(),
        dst_dir.display()
    );
    Ok(())
}

/// Single file, one `<path> = <value>` line per key.
pub fn write_properties_text<P: AsRef<Path>>(data: &FlatMap, path: P) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(fs::File::create(path)?);
    for (key, value) in data {
        writeln!(writer, "{key} = {}", render_value(value))?;
    }
    writer.flush()
}

/// Pretty-printed dump of the whole (unflattened) result.
pub fn write_json<T: Serialize, P: AsRef<Path>>(data: &T, path: P) -> io::Result<()> {
    let mut json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    json.push('\n');
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn plot_property_file_contents() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("d");
        let mut data = FlatMap::new();
        data.insert("k".to_string(), json!(5));

        write_plot_properties(&data, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("k.properties")).unwrap(), "YVALUE=5\n");
    }

    #[test]
    fn plot_properties_create_nested_dirs_and_tolerate_existing() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("a").join("b");
        let data = flatten(&json!({"4_cpus": {"basic.baseline.start_time": 0.25}}));

        write_plot_properties(&data, &dst).unwrap();
        write_plot_properties(&data, &dst).unwrap();

        let written =
            fs::read_to_string(dst.join("4_cpus.basic.baseline.start_time.properties")).unwrap();
        assert_eq!(written, "YVALUE=0.25\n");
    }

    #[test]
    fn strings_are_written_unquoted() {
        let mut data = FlatMap::new();
        data.insert("name".to_string(), json!("sha2"));
        data.insert("missing".to_string(), Value::Null);
        assert_eq!(render_value(&data["name"]), "sha2");
        assert_eq!(render_value(&data["missing"]), "None");
        assert_eq!(render_value(&json!(2.0)), "2.0");
    }

    #[test]
    fn properties_text_one_line_per_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("benchmarks.properties");
        let data = flatten(&json!({"b": 2, "a": {"x": "y"}}));

        write_properties_text(&data, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a.x = y\nb = 2\n");
    }

    #[test]
    fn json_dump_is_deterministic() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("1.json");
        let second = dir.path().join("2.json");
        let data = json!({"z": [1, 2], "a": {"m": null, "b": 1.5}});

        write_json(&data, &first).unwrap();
        write_json(&data, &second).unwrap();

        let text = fs::read_to_string(&first).unwrap();
        assert_eq!(text, fs::read_to_string(&second).unwrap());
        assert!(text.find("\"a\"").unwrap() < text.find("\"z\"").unwrap());
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, data);
    }
}
