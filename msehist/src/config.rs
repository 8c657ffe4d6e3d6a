use std::{fs, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

/// Short dev universe mirroring the exchange's most liquid codes; prod reads
/// the full list from the instruments file.
const DEV_INSTRUMENTS: &[&str] = &[
    "ADIN", "ALK", "ALKB", "BGOR", "BIKF", "CEVI", "CKB", "GALE", "MKPT",
];

const INSTRUMENTS_FILE: &str = "instruments.txt";

/// Deployment target for the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

/// Everything the harvester run needs, resolved up front and passed by value.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: Environment,
    pub state_dir: PathBuf,
    pub base_url: &'static str,
    pub instruments: Vec<String>,
    pub max_span_days: u32,
    pub lookback_days: u64,
    pub max_parallel: usize,
    pub fetch_attempts: usize,
    pub fetch_timeout: Duration,
}

impl AppConfig {
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        let state_dir = state_dir_for(env);
        let instruments = match env {
            Environment::Dev => DEV_INSTRUMENTS.iter().map(|s| s.to_string()).collect(),
            Environment::Prod => read_instruments(&state_dir.join(INSTRUMENTS_FILE))?,
        };
        Ok(Self {
            env,
            state_dir,
            base_url: "https://www.mse.mk/en/stats/symbolhistory",
            instruments,
            max_span_days: 364,
            lookback_days: 3_650,
            max_parallel: 8,
            fetch_attempts: 3,
            fetch_timeout: Duration::from_secs(30),
        })
    }

    pub fn env_label(&self) -> &'static str {
        match self.env {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.state_dir.join("watermarks.json")
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.state_dir.join("history.csv")
    }
}

fn state_dir_for(env: Environment) -> PathBuf {
    match env {
        Environment::Dev => PathBuf::from("msehist.state"),
        Environment::Prod => PathBuf::from("/var/lib/msehist"),
    }
}

/// One code per line; blank lines and `#` comments are skipped.
fn read_instruments(path: &PathBuf) -> Result<Vec<String>, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::InstrumentsFile {
        path: path.clone(),
        source,
    })?;
    let instruments: Vec<String> = data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if instruments.is_empty() {
        return Err(ConfigError::EmptyInstrumentsFile { path: path.clone() });
    }
    Ok(instruments)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown environment {value:?} (expected dev or prod)")]
    UnknownEnvironment { value: String },
    #[error("failed to read instruments file {path:?}: {source}")]
    InstrumentsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("instruments file {path:?} lists no instruments")]
    EmptyInstrumentsFile { path: PathBuf },
}
