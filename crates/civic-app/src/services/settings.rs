//! One-time migration of pre-1.0 `settings.ini` into `settings.toml`.

use std::path::{Path, PathBuf};

use toml::{Table, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    NothingToMigrate,
    /// Both files exist; the TOML file wins and the INI file is left alone.
    AlreadyMigrated,
    Migrated { keys: usize },
}

#[derive(Debug, Clone)]
pub struct SettingsMigrator {
    legacy: PathBuf,
    current: PathBuf,
}

impl SettingsMigrator {
    pub fn new(legacy: impl Into<PathBuf>, current: impl Into<PathBuf>) -> Self {
        Self {
            legacy: legacy.into(),
            current: current.into(),
        }
    }

    pub async fn migrate(&self) -> Result<MigrationOutcome, String> {
        if !exists(&self.legacy).await {
            return Ok(MigrationOutcome::NothingToMigrate);
        }
        if exists(&self.current).await {
            tracing::debug!(legacy = %self.legacy.display(), "settings already migrated");
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        let text = tokio::fs::read_to_string(&self.legacy)
            .await
            .map_err(|e| format!("{}: {e}", self.legacy.display()))?;
        let (table, keys) = parse_ini(&text)?;
        let rendered =
            toml::to_string_pretty(&table).map_err(|e| format!("could not render settings: {e}"))?;

        // settings.toml only ever appears complete.
        let staging = self.current.with_extension("toml.tmp");
        tokio::fs::write(&staging, rendered)
            .await
            .map_err(|e| format!("{}: {e}", staging.display()))?;
        tokio::fs::rename(&staging, &self.current)
            .await
            .map_err(|e| format!("{}: {e}", self.current.display()))?;

        let backup = self.legacy.with_extension("ini.bak");
        if let Err(e) = tokio::fs::rename(&self.legacy, &backup).await {
            tracing::warn!(error = %e, "legacy settings left in place");
        }
        tracing::info!(keys, path = %self.current.display(), "user settings migrated");
        Ok(MigrationOutcome::Migrated { keys })
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// `[section]` headers and `key = value` lines. Values become booleans or
/// integers where they parse as such, strings otherwise.
fn parse_ini(text: &str) -> Result<(Table, usize), String> {
    let mut root = Table::new();
    let mut section: Option<String> = None;
    let mut keys = 0;

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(format!("settings.ini line {}: empty section name", number + 1));
            }
            root.entry(name.clone())
                .or_insert_with(|| Value::Table(Table::new()));
            section = Some(name);
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!(
                "settings.ini line {}: expected key = value",
                number + 1
            ));
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(format!("settings.ini line {}: empty key", number + 1));
        }

        let target = match &section {
            Some(name) => match root.get_mut(name) {
                Some(Value::Table(table)) => table,
                _ => return Err(format!("settings.ini line {}: section clash", number + 1)),
            },
            None => &mut root,
        };
        target.insert(key, scalar(value.trim()));
        keys += 1;
    }
    Ok((root, keys))
}

fn scalar(raw: &str) -> Value {
    let unquoted = raw.trim_matches('"');
    if unquoted.len() != raw.len() {
        return Value::String(unquoted.to_string());
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Value::Boolean(true),
        "false" | "no" | "off" => return Value::Boolean(false),
        _ => {}
    }
    raw.parse::<i64>()
        .map(Value::Integer)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ini_sections_become_tables() {
        let (table, keys) = parse_ini(
            "; exported by 0.9\ntheme = dark\n[Reports]\nfiscal_year_start = 7\nshow_cents = yes\ntitle = \"FY 2026\"\n",
        )
        .unwrap();
        assert_eq!(keys, 4);
        assert_eq!(table["theme"].as_str(), Some("dark"));
        let reports = table["reports"].as_table().unwrap();
        assert_eq!(reports["fiscal_year_start"].as_integer(), Some(7));
        assert_eq!(reports["show_cents"].as_bool(), Some(true));
        assert_eq!(reports["title"].as_str(), Some("FY 2026"));
    }

    #[test]
    fn line_without_equals_is_rejected() {
        let err = parse_ini("[general]\njust some text\n").unwrap_err();
        assert!(err.contains("line 2"), "{err}");
    }

    #[tokio::test]
    async fn migrates_once_and_keeps_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("settings.ini");
        let current = dir.path().join("settings.toml");
        std::fs::write(&legacy, "[general]\nlanguage = en\n").unwrap();
        let migrator = SettingsMigrator::new(&legacy, &current);

        assert_eq!(
            migrator.migrate().await.unwrap(),
            MigrationOutcome::Migrated { keys: 1 }
        );
        let migrated: Table = toml::from_str(&std::fs::read_to_string(&current).unwrap()).unwrap();
        assert_eq!(migrated["general"]["language"].as_str(), Some("en"));
        assert!(!legacy.exists());
        assert!(dir.path().join("settings.ini.bak").exists());

        assert_eq!(
            migrator.migrate().await.unwrap(),
            MigrationOutcome::NothingToMigrate
        );
    }

    #[tokio::test]
    async fn existing_toml_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("settings.ini");
        let current = dir.path().join("settings.toml");
        std::fs::write(&legacy, "language = fr\n").unwrap();
        std::fs::write(&current, "language = \"en\"\n").unwrap();

        let outcome = SettingsMigrator::new(&legacy, &current).migrate().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::AlreadyMigrated);
        assert!(std::fs::read_to_string(&current).unwrap().contains("en"));
        assert!(legacy.exists());
    }
}
