//! Interface de linha de comando do realign baseada em clap.
//!
//! Todas as flags são opcionais; quando presentes, sobrescrevem os valores
//! vindos de `realign.toml` e das variáveis de ambiente.

use clap::Parser;
use std::path::PathBuf;

/// realign: servidor HTTP de alinhamento forçado entre áudio e transcrição.
#[derive(Debug, Parser)]
#[command(name = "realign", version, about)]
pub struct Cli {
    /// Endereço em que o servidor escuta.
    #[arg(long)]
    pub host: Option<String>,

    /// Porta em que o servidor escuta.
    #[arg(long)]
    pub port: Option<u16>,

    /// Número de threads repassado ao alinhador.
    #[arg(long)]
    pub nthreads: Option<usize>,

    /// Número máximo de alinhamentos executando ao mesmo tempo.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Nível de log (trace, debug, info, warn, error).
    #[arg(long)]
    pub log: Option<String>,

    /// URL notificada ao fim de cada job.
    #[arg(long)]
    pub webhook: Option<String>,

    /// Diretório de dados onde ficam os workspaces dos jobs.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_without_flags() {
        let cli = Cli::parse_from(["realign"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.webhook.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_parses_all_flags() {
        let cli = Cli::parse_from([
            "realign",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--nthreads",
            "2",
            "--workers",
            "3",
            "--log",
            "debug",
            "--webhook",
            "http://hooks.local/done",
            "--data-dir",
            "/srv/realign",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.nthreads, Some(2));
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert_eq!(cli.webhook.as_deref(), Some("http://hooks.local/done"));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/realign")));
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn cli_rejects_invalid_port() {
        assert!(Cli::try_parse_from(["realign", "--port", "not-a-port"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
