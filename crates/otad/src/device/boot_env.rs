//! Bootloader environment access
//!
//! `UBootEnv` shells out to the U-Boot userspace tools. `MemoryBootEnv`
//! keeps variables in a map for tests.

use async_trait::async_trait;
use ota_common::OtaError;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait BootEnvironment: Send + Sync {
    /// Read the named variables. Unset variables are absent from the map.
    async fn read_vars(&self, names: &[&str]) -> Result<HashMap<String, String>, OtaError>;

    /// Set all variables in one write
    async fn write_vars(&self, vars: &[(&str, &str)]) -> Result<(), OtaError>;
}

/// Parse `name=value` lines as printed by `fw_printenv`.
///
/// Lines without `=` are skipped.
pub fn parse_env_output(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

/// U-Boot environment via `fw_printenv` / `fw_setenv`
#[derive(Debug, Clone)]
pub struct UBootEnv {
    printenv: String,
    setenv: String,
}

impl UBootEnv {
    pub fn new() -> Self {
        Self {
            printenv: "fw_printenv".to_string(),
            setenv: "fw_setenv".to_string(),
        }
    }
}

impl Default for UBootEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BootEnvironment for UBootEnv {
    async fn read_vars(&self, names: &[&str]) -> Result<HashMap<String, String>, OtaError> {
        let output = Command::new(&self.printenv)
            .args(names)
            .output()
            .await
            .map_err(|e| OtaError::BootEnv(format!("failed to run {}: {}", self.printenv, e)))?;

        // fw_printenv exits non-zero when a requested variable is unset but
        // still prints the ones it found.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let vars = parse_env_output(&stdout);
        if !output.status.success() && vars.is_empty() {
            return Err(OtaError::BootEnv(format!(
                "{} failed: {}",
                self.printenv,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(?vars, "Read boot environment");
        Ok(vars)
    }

    async fn write_vars(&self, vars: &[(&str, &str)]) -> Result<(), OtaError> {
        let script: String = vars
            .iter()
            .map(|(name, value)| format!("{} {}\n", name, value))
            .collect();

        let mut child = Command::new(&self.setenv)
            .args(["-s", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OtaError::BootEnv(format!("failed to run {}: {}", self.setenv, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OtaError::BootEnv(format!(
                "{} failed: {}",
                self.setenv,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(?vars, "Wrote boot environment");
        Ok(())
    }
}

/// In-memory boot environment
#[derive(Debug, Default)]
pub struct MemoryBootEnv {
    vars: Mutex<HashMap<String, String>>,
    fail_writes: bool,
}

impl MemoryBootEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment booted from partition number `part`
    pub fn booted_from(part: &str) -> Self {
        let env = Self::new();
        env.set(crate::device::BOOT_PART_VAR, part);
        env
    }

    /// Every write fails
    pub fn read_only(self) -> Self {
        Self {
            fail_writes: true,
            ..self
        }
    }

    pub fn set(&self, name: &str, value: &str) {
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl BootEnvironment for MemoryBootEnv {
    async fn read_vars(&self, names: &[&str]) -> Result<HashMap<String, String>, OtaError> {
        let vars = self.vars.lock().unwrap();
        Ok(names
            .iter()
            .filter_map(|name| vars.get(*name).map(|v| (name.to_string(), v.clone())))
            .collect())
    }

    async fn write_vars(&self, vars: &[(&str, &str)]) -> Result<(), OtaError> {
        if self.fail_writes {
            return Err(OtaError::BootEnv("environment is read-only".to_string()));
        }
        let mut current = self.vars.lock().unwrap();
        for (name, value) in vars {
            current.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_output() {
        let vars = parse_env_output("boot_part=2\nupgrade_available=0\n");
        assert_eq!(vars.get("boot_part").map(String::as_str), Some("2"));
        assert_eq!(vars.get("upgrade_available").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_parse_env_output_skips_noise() {
        let vars = parse_env_output("## Error: \"bootcount\" not defined\nbootcmd=run a=b\n\n");
        assert_eq!(vars.len(), 1);
        // only the first '=' separates name from value
        assert_eq!(vars.get("bootcmd").map(String::as_str), Some("run a=b"));
    }

    #[tokio::test]
    async fn test_memory_env_round_trip() {
        let env = MemoryBootEnv::booted_from("2");
        env.write_vars(&[("bootcount", "0")]).await.unwrap();

        let vars = env.read_vars(&["boot_part", "bootcount", "unset"]).await.unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["bootcount"], "0");
    }

    #[tokio::test]
    async fn test_read_only_env_rejects_writes() {
        let env = MemoryBootEnv::new().read_only();
        let err = env.write_vars(&[("bootcount", "0")]).await.unwrap_err();
        assert!(matches!(err, OtaError::BootEnv(_)));
    }
}
