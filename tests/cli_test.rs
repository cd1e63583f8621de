//! CLI integration tests for schema-select binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("schema-select"))
}

// Helper to create a temp input file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const PERSON: &str = r#"{
    "type": "object",
    "shape": {
        "age": { "type": "optional", "inner": "number" },
        "firstName": "string",
        "lastName": "string"
    }
}"#;

const ROLE: &str = r#"{
    "definitions": {
        "Role": {
            "type": "object",
            "shape": {
                "name": "string",
                "roles": { "type": "array", "element": { "$ref": "Role" } }
            }
        }
    },
    "schema": { "$ref": "Role" }
}"#;

mod select_command {
    use super::*;

    #[test]
    fn prints_strict_select_schema() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);

        cmd()
            .args(["select", schema.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""additionalProperties":false"#))
            .stdout(predicate::str::contains(r#""firstName":{"type":"boolean"}"#));
    }

    #[test]
    fn recursive_schema_uses_defs() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", ROLE);

        cmd()
            .args(["select", schema.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""$defs""#))
            .stdout(predicate::str::contains(r##""$ref":"#/$defs/lazy0""##));
    }

    #[test]
    fn select_with_pretty() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);

        cmd()
            .args(["select", schema.to_str().unwrap(), "--pretty"])
            .assert()
            .success()
            .stdout(predicate::str::contains("{\n"));
    }

    #[test]
    fn select_with_output_file() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let output = dir.path().join("select.json");

        cmd()
            .args([
                "select",
                schema.to_str().unwrap(),
                "--output",
                output.to_str().unwrap(),
            ])
            .assert()
            .success();

        let content = fs::read_to_string(&output).unwrap();
        let exported: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(exported["type"], "object");
        assert!(exported["properties"].get("lastName").is_some());
    }
}

mod refine_command {
    use super::*;

    #[test]
    fn keeps_named_fields() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let shape = write_temp_file(&dir, "shape.json", r#"{"firstName": true, "age": false}"#);

        let output = cmd()
            .args([
                "refine",
                schema.to_str().unwrap(),
                "--shape",
                shape.to_str().unwrap(),
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let exported: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let properties = exported["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 1);
        assert!(properties.contains_key("firstName"));
        assert_eq!(exported["required"], serde_json::json!(["firstName"]));
        assert!(exported.get("additionalProperties").is_none());
    }

    #[test]
    fn preserve_unknown_keys_flag() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"type":"object","shape":{"id":"string"},"unknownKeys":"strict"}"#,
        );
        let shape = write_temp_file(&dir, "shape.json", r#"{"id": true}"#);

        cmd()
            .args([
                "refine",
                schema.to_str().unwrap(),
                "--shape",
                shape.to_str().unwrap(),
                "--preserve-unknown-keys",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""additionalProperties":false"#));
    }

    #[test]
    fn unsupported_schema_kind() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", r#""string""#);
        let shape = write_temp_file(&dir, "shape.json", r#"{"id": true}"#);

        cmd()
            .args([
                "refine",
                schema.to_str().unwrap(),
                "--shape",
                shape.to_str().unwrap(),
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unsupported schema kind"));
    }

    #[test]
    fn invalid_descriptor_value() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let shape = write_temp_file(&dir, "shape.json", r#"{"firstName": "yes"}"#);

        cmd()
            .args([
                "refine",
                schema.to_str().unwrap(),
                "--shape",
                shape.to_str().unwrap(),
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("/firstName"));
    }
}

mod parse_command {
    use super::*;

    #[test]
    fn parses_against_schema() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let payload = write_temp_file(
            &dir,
            "payload.json",
            r#"{"firstName": "John", "lastName": "Doe", "extra": 1}"#,
        );

        cmd()
            .args([
                "parse",
                schema.to_str().unwrap(),
                payload.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"firstName":"John","lastName":"Doe"}"#));
    }

    #[test]
    fn parses_against_refined_schema() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let shape = write_temp_file(&dir, "shape.json", r#"{"lastName": true}"#);
        let payload = write_temp_file(
            &dir,
            "payload.json",
            r#"{"age": 30, "lastName": "Doe"}"#,
        );

        cmd()
            .args([
                "parse",
                schema.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--shape",
                shape.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"lastName":"Doe"}"#));
    }

    #[test]
    fn selection_with_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let payload = write_temp_file(&dir, "payload.json", r#"{"unknown": true}"#);

        cmd()
            .args([
                "parse",
                schema.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--select",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("unrecognized key(s) in object"));
    }

    #[test]
    fn recursive_selection() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", ROLE);
        let payload = write_temp_file(
            &dir,
            "payload.json",
            r#"{"name": true, "roles": {"roles": {"name": true}}}"#,
        );

        cmd()
            .args([
                "parse",
                schema.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--select",
                "--json",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""valid":true"#));
    }

    #[test]
    fn json_output_lists_issues() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let payload = write_temp_file(&dir, "payload.json", r#"{"firstName": 1}"#);

        cmd()
            .args([
                "parse",
                schema.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--json",
            ])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""valid":false"#))
            .stdout(predicate::str::contains(r#""path":"/firstName""#))
            .stdout(predicate::str::contains(r#""code":"invalid_type""#));
    }

    #[test]
    fn shape_and_select_conflict() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);
        let payload = write_temp_file(&dir, "payload.json", "{}");

        cmd()
            .args([
                "parse",
                schema.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--select",
                "--shape",
                "shape.json",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot be used with"));
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn file_not_found() {
        cmd()
            .args(["select", "/nonexistent/schema.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn invalid_json_schema() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", "not valid json");

        cmd()
            .args(["select", schema.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid JSON"));
    }

    #[test]
    fn unknown_reference() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"definitions": {}, "schema": {"$ref": "Missing"}}"#,
        );

        cmd()
            .args(["select", schema.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unknown definition \"Missing\""));
    }

    #[test]
    fn json_output_file_error() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", PERSON);

        cmd()
            .args([
                "parse",
                schema.to_str().unwrap(),
                "/nonexistent/payload.json",
                "--json",
            ])
            .assert()
            .code(3)
            .stdout(predicate::str::contains(r#""valid":false"#))
            .stdout(predicate::str::contains("loading payload"));
    }
}

mod help_and_version {
    use super::*;

    #[test]
    fn help_flag() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("select"))
            .stdout(predicate::str::contains("refine"))
            .stdout(predicate::str::contains("parse"));
    }

    #[test]
    fn version_flag() {
        cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("schema-select"));
    }

    #[test]
    fn missing_shape_flag() {
        cmd()
            .args(["refine", "schema.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--shape"));
    }
}
