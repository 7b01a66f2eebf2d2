use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const PLACES: &str = concat!(
    r#"{"type":"Feature","properties":{"name":"Ashby","pop":5,"capital":false,"note":null},"geometry":{"type":"Point","coordinates":[-1.39,52.74]}}"#,
    "\n",
    r#"{"type":"Feature","properties":{"name":"Bream","pop":7.5,"capital":true,"note":null},"geometry":{"type":"Point","coordinates":[-2.57,51.75]}}"#,
    "\n",
    r#"{"type":"Feature","properties":{"name":"Crewe","pop":"n/a","capital":false,"note":null},"geometry":{"type":"Point","coordinates":[-2.44,53.1]}}"#,
    "\n"
);

fn write_fixture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, PLACES).expect("write fixture");
    path
}

fn run_geondjson(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_geondjson"))
        .args(args)
        .env("GEONDJSON_OGR2OGR", "/nonexistent/ogr2ogr")
        .env("GEONDJSON_OGRINFO", "/nonexistent/ogrinfo")
        .stdin(Stdio::null())
        .output()
        .expect("run geondjson")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "geondjson failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

fn assert_failure(output: &Output, message: &str) {
    assert!(!output.status.success(), "expected failure");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(message), "stderr was: {stderr}");
}

fn read_rows(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .expect("read output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

#[test]
fn converts_a_geojsonseq_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "places.geojsonl");

    let output = run_geondjson(&[source.to_str().unwrap()]);
    assert_success(&output);

    let rows = read_rows(&dir.path().join("places.json"));
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["name"], "Ashby");
    assert_eq!(
        rows[0]["geometry"],
        r#"{"type":"Point","coordinates":[-1.39,52.74]}"#
    );

    let schema: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("places_SCHEMA.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(schema["name"], "STRING");
    assert_eq!(schema["pop"], "STRING");
    assert_eq!(schema["capital"], "BOOLEAN");
    assert_eq!(schema["note"], "UNKNOWN");
    assert_eq!(schema["geometry"], "GEOGRAPHY");

    let text = std::fs::read_to_string(dir.path().join("places_SCHEMA.txt")).unwrap();
    assert_eq!(
        text,
        "name:STRING,\npop:STRING,\ncapital:BOOLEAN,\nnote:UNKNOWN,\ngeometry:GEOGRAPHY"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not be determined: note"), "{stderr}");
}

#[test]
fn renames_and_limits_geographic_columns() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "places.geojsonl");

    let output = run_geondjson(&[
        source.to_str().unwrap(),
        "--columns",
        r#"{"geojson_geometry":"geom_json","geojson":"feature"}"#,
    ]);
    assert_success(&output);

    let rows = read_rows(&dir.path().join("places.json"));
    let keys: Vec<&str> = rows[1]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, vec!["name", "pop", "capital", "note", "feature", "geom_json"]);
    let feature: serde_json::Value =
        serde_json::from_str(rows[1]["feature"].as_str().unwrap()).unwrap();
    assert_eq!(feature["properties"]["name"], "Bream");

    let text = std::fs::read_to_string(dir.path().join("places_SCHEMA.txt")).unwrap();
    assert!(text.ends_with("feature:STRING,\ngeom_json:STRING"));
    assert!(!text.contains("GEOGRAPHY"));
}

#[test]
fn existing_outputs_get_numbered_names() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "places.geojsonl");
    let source = source.to_str().unwrap();

    assert_success(&run_geondjson(&[source]));
    assert_success(&run_geondjson(&[source]));
    assert!(dir.path().join("places_01.json").exists());
    assert!(dir.path().join("places_01_SCHEMA.json").exists());
    assert!(dir.path().join("places_01_SCHEMA.txt").exists());

    assert_success(&run_geondjson(&[source, "--force-overwrite"]));
    assert!(!dir.path().join("places_02.json").exists());
}

#[test]
fn explicit_output_conflict_without_terminal_fails() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "places.geojsonl");
    let target = dir.path().join("target.json");
    std::fs::write(&target, "keep me").unwrap();

    let output = run_geondjson(&[
        source.to_str().unwrap(),
        "-o",
        target.to_str().unwrap(),
    ]);
    assert_failure(&output, "already exists");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep me");

    let output = run_geondjson(&[
        source.to_str().unwrap(),
        "-o",
        target.to_str().unwrap(),
        "-f",
        "--skip-schemas",
    ]);
    assert_success(&output);
    assert_eq!(read_rows(&target).len(), 3);
    assert!(!dir.path().join("target_SCHEMA.json").exists());
}

#[test]
fn creates_parent_directories_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "places.geojsonl");
    let target = dir.path().join("nested/deeper/out.json");

    let output = run_geondjson(&[source.to_str().unwrap(), "-o", target.to_str().unwrap()]);
    assert_failure(&output, "--create-parents");

    let output = run_geondjson(&[
        source.to_str().unwrap(),
        "-o",
        target.to_str().unwrap(),
        "-p",
    ]);
    assert_success(&output);
    assert!(target.exists());
    assert!(dir.path().join("nested/deeper/out_SCHEMA.txt").exists());
}

#[test]
fn converts_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "a.geojsonl");
    write_fixture(dir.path(), "b.geojsonl");
    std::fs::write(dir.path().join("readme.txt"), "not data").unwrap();
    let out = dir.path().join("out");

    let output = run_geondjson(&[
        dir.path().to_str().unwrap(),
        "-e",
        "geojsonl",
        "-d",
        out.to_str().unwrap(),
        "-p",
        "--verbose",
    ]);
    assert_success(&output);

    let mut names: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["a.json", "a_SCHEMA.json", "a_SCHEMA.txt", "b.json", "b_SCHEMA.json", "b_SCHEMA.txt"]
    );
}

#[test]
fn batch_failures_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "a.geojsonl");
    std::fs::write(
        dir.path().join("b.geojsonl"),
        "{\"type\":\"Feature\",\"properties\":{},\"geometry\":null}\n{broken\n",
    )
    .unwrap();
    write_fixture(dir.path(), "c.geojsonl");
    let dir_str = dir.path().to_str().unwrap();

    let output = run_geondjson(&[dir_str, "-e", "geojsonl", "-s"]);
    assert_failure(&output, "b.geojsonl");
    assert!(dir.path().join("a.json").exists());
    assert!(!dir.path().join("b.json").exists());
    assert!(!dir.path().join("c.json").exists());

    let output = run_geondjson(&[dir_str, "-e", "geojsonl", "-s", "--on-error", "continue"]);
    assert_failure(&output, "1 of 3 file(s) failed");
    assert!(dir.path().join("c.json").exists());
}

#[test]
fn rejects_invalid_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "places.geojsonl");
    let source = source.to_str().unwrap();
    let dir_str = dir.path().to_str().unwrap();

    assert_failure(&run_geondjson(&[""]), "source cannot be an empty string");
    assert_failure(
        &run_geondjson(&[&format!("{dir_str}/nope.shp")]),
        "does not exist",
    );
    assert_failure(&run_geondjson(&[dir_str]), "--extension / -e is required");
    assert_failure(&run_geondjson(&[source, "-e", "shp"]), "cannot be used when the source path is to a file");
    assert_failure(
        &run_geondjson(&[source, "-v", "-t_srs EPSG:3857"]),
        "\"-t_srs\" is reserved",
    );
    assert_failure(&run_geondjson(&[source, "-c", "{bad"]), "Invalid Columns");
    assert_failure(
        &run_geondjson(&[source, "-d", &format!("{dir_str}/missing")]),
        "Invalid Output Path",
    );

    // nothing was written by the rejected runs
    assert!(!dir.path().join("places.json").exists());
}

#[test]
fn unsupported_sources_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("roads.shp");
    std::fs::write(&source, [0u8, 0, 39, 10]).unwrap();

    let output = run_geondjson(&[source.to_str().unwrap()]);
    assert_failure(&output, "not recognized as a supported geofile format");
}

#[test]
fn reads_defaults_from_a_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "places.geojsonl");
    let settings = dir.path().join("settings.yaml");
    std::fs::write(&settings, "columns:\n  - geojson_geometry\nskip_schemas: true\n").unwrap();

    let output = run_geondjson(&[
        source.to_str().unwrap(),
        "--settings",
        settings.to_str().unwrap(),
    ]);
    assert_success(&output);

    let rows = read_rows(&dir.path().join("places.json"));
    assert!(rows[0].get("geojson_geometry").is_some());
    assert!(rows[0].get("geometry").is_none());
    assert!(!dir.path().join("places_SCHEMA.json").exists());
}
