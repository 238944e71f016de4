use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use mathscrub::args::ScrubArgs;

pub struct TestEnvironment {
    _temp_dir: TempDir, // kept for Drop cleanup
    pub blocklist_path: PathBuf,
    pub corpus_dir: PathBuf,
    pub report_dir: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let blocklist_dir = temp_dir.path().join("blocklist");
        let corpus_dir = temp_dir.path().join("processed");
        let report_dir = temp_dir.path().join("reports");
        let config_path = temp_dir.path().join("config.yaml");

        fs::create_dir_all(&blocklist_dir)?;
        fs::create_dir_all(&corpus_dir)?;

        Ok(TestEnvironment {
            blocklist_path: blocklist_dir.join("aimo_ref.txt"),
            _temp_dir: temp_dir,
            corpus_dir,
            report_dir,
            config_path,
        })
    }

    #[allow(dead_code)]
    pub fn corpus_file(&self, name: &str) -> PathBuf {
        self.corpus_dir.join(name)
    }
}

pub fn fixture_path(fixture: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(fixture)
}

/// Copy a fixture file to `dest`
pub fn copy_fixture(fixture: &str, dest: &Path) -> Result<PathBuf> {
    let source = fixture_path(fixture);
    if !source.exists() {
        anyhow::bail!("Fixture file not found: {:?}", source);
    }
    fs::copy(&source, dest)?;
    Ok(dest.to_path_buf())
}

/// Copy a config fixture and point it at the test directories
#[allow(dead_code)]
pub fn copy_and_update_config(config_fixture: &str, env: &TestEnvironment) -> Result<()> {
    let config_content = fs::read_to_string(fixture_path(&format!("configs/{}", config_fixture)))?;
    let mut config: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&config_content)?;

    config.insert(
        "blocklist".to_string(),
        serde_yaml::Value::String(env.blocklist_path.to_string_lossy().into_owned()),
    );
    config.insert(
        "corpus_input".to_string(),
        serde_yaml::Value::String(env.corpus_dir.to_string_lossy().into_owned()),
    );
    config.insert(
        "report_output_dir".to_string(),
        serde_yaml::Value::String(env.report_dir.to_string_lossy().into_owned()),
    );

    let yaml_content = serde_yaml::to_string(&config)?;
    let mut file = File::create(&env.config_path)?;
    file.write_all(yaml_content.as_bytes())?;
    Ok(())
}

/// Blocklist and corpus fixtures copied in, config rewritten to match
#[allow(dead_code)]
pub fn setup_test_with_fixtures(
    blocklist_fixture: &str,
    corpus_fixture: &str,
    config_fixture: &str,
) -> Result<TestEnvironment> {
    let env = TestEnvironment::new()?;
    copy_fixture(&format!("blocklist/{}", blocklist_fixture), &env.blocklist_path)?;
    let name = Path::new(corpus_fixture)
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid fixture path"))?;
    copy_fixture(&format!("corpus/{}", corpus_fixture), &env.corpus_dir.join(name))?;
    copy_and_update_config(config_fixture, &env)?;
    Ok(env)
}

#[allow(dead_code)]
pub fn create_default_args(config_path: PathBuf) -> ScrubArgs {
    ScrubArgs {
        config: Some(config_path),
        ..ScrubArgs::default()
    }
}

/// `problem` field of every line that parses, in file order
#[allow(dead_code)]
pub fn read_problems(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let mut problems = Vec::new();
    for line in content.lines() {
        let row: Value = serde_json::from_str(line)?;
        problems.push(row["problem"].as_str().unwrap_or_default().to_string());
    }
    Ok(problems)
}

#[allow(dead_code)]
pub fn read_report(report_dir: &Path) -> Result<Vec<Value>> {
    let path = report_dir.join(mathscrub::scrub::REPORT_FILENAME);
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str::<Value>(line)?))
        .collect()
}

#[allow(dead_code)]
pub fn temp_leftovers(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut leftovers = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            leftovers.push(path);
        }
    }
    Ok(leftovers)
}
