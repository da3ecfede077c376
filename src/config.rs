//! Configuração do realign carregada a partir de `realign.toml`.
//!
//! A struct [`RealignConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `REALIGN_WEBHOOK_URL` tem precedência sobre o
//! arquivo, e as flags da CLI têm precedência sobre ambos.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "realign.toml";

/// Variável de ambiente que sobrescreve `webhook_url`.
pub const WEBHOOK_ENV: &str = "REALIGN_WEBHOOK_URL";

/// Configuração de nível superior carregada de `realign.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RealignConfig {
    /// Endereço em que o servidor HTTP escuta.
    #[serde(default = "default_host")]
    pub host: String,

    /// Porta em que o servidor HTTP escuta.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Diretório de dados; os workspaces ficam em `<data_dir>/transcriptions`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Destino opcional das notificações de fim de job.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Tamanho do pool de alinhamento.
    #[serde(default = "default_parallelism")]
    pub alignment_workers: usize,

    /// Threads repassadas ao alinhador em cada execução.
    #[serde(default = "default_parallelism")]
    pub align_threads: usize,

    /// Nível de log usado quando `RUST_LOG` não está definido.
    #[serde(default = "default_log")]
    pub log: String,

    /// Tempo máximo sem receber dados durante um download, em segundos.
    /// Não há limite para a duração total da transferência.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Tempo máximo de cada envio de webhook, em segundos.
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    /// Programas externos usados para reamostrar e alinhar.
    #[serde(default)]
    pub aligner: AlignerConfig,
}

/// Seção `[aligner]`: como invocar o reamostrador e o alinhador.
#[derive(Debug, Clone, Deserialize)]
pub struct AlignerConfig {
    /// Executável do ffmpeg.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// Programa do alinhador.
    #[serde(default = "default_program")]
    pub program: String,

    /// Argumentos fixos passados antes dos caminhos de áudio e transcrição.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Diretório de recursos (modelos); o alinhador roda a partir dele.
    #[serde(default = "default_resources_dir")]
    pub resources_dir: PathBuf,
}

// Valor padrão para o host: todas as interfaces.
fn default_host() -> String {
    "0.0.0.0".to_string()
}

// Valor padrão para a porta: 8765.
fn default_port() -> u16 {
    8765
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("webdata")
}

// Paralelismo disponível na máquina, ou 1 se não for possível detectá-lo.
fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_log() -> String {
    "info".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["align.py".to_string()]
}

fn default_resources_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            program: default_program(),
            args: default_args(),
            resources_dir: default_resources_dir(),
        }
    }
}

impl Default for RealignConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            webhook_url: None,
            alignment_workers: default_parallelism(),
            align_threads: default_parallelism(),
            log: default_log(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
            aligner: AlignerConfig::default(),
        }
    }
}

impl RealignConfig {
    /// Carrega a configuração de `path`, ou de `realign.toml` no diretório
    /// atual. Usa valores padrão se o arquivo padrão não existir; um caminho
    /// explícito inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if !path.exists() => {
                bail!("Arquivo de configuração não encontrado: {}", path.display())
            }
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para o webhook.
        config.apply_webhook_env(std::env::var(WEBHOOK_ENV).ok());
        config.clamp();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Falha ao ler {}", path.display()))?;
        toml::from_str::<RealignConfig>(&contents)
            .with_context(|| format!("Configuração inválida em {}", path.display()))
    }

    fn apply_webhook_env(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|v| !v.trim().is_empty()) {
            self.webhook_url = Some(url);
        }
    }

    /// Aplica as flags da CLI, que vencem o arquivo e o ambiente.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(n) = cli.nthreads {
            self.align_threads = n;
        }
        if let Some(n) = cli.workers {
            self.alignment_workers = n;
        }
        if let Some(log) = &cli.log {
            self.log = log.clone();
        }
        if let Some(url) = &cli.webhook {
            self.webhook_url = Some(url.clone());
        }
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        self.clamp();
    }

    // Contagens zeradas viram 1.
    fn clamp(&mut self) {
        self.alignment_workers = self.alignment_workers.max(1);
        self.align_threads = self.align_threads.max(1);
    }

    /// Endereço `host:port` para o listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}
