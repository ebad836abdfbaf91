//! Interface de linha de comando do meshcache.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::types::Input;
use crate::{MeshCacheError, MeshCacheResult};

/// meshcache - cache por similaridade e avaliador de qualidade para modelos 3D gerados.
#[derive(Parser, Debug)]
#[command(name = "meshcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Arquivo de configuração. Padrão: ./meshcache.toml, depois o diretório
    /// de configuração do usuário.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Modo verbose.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Modo silencioso.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Imprime resultados em JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Comando a executar.
    #[command(subcommand)]
    pub command: Commands,
}

/// Um prompt de texto ou um arquivo de imagem.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct InputArgs {
    /// Prompt de texto.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Arquivo de imagem.
    #[arg(short, long)]
    pub image: Option<PathBuf>,
}

impl InputArgs {
    pub fn to_input(&self) -> MeshCacheResult<Input> {
        match (&self.prompt, &self.image) {
            (Some(prompt), _) => Ok(Input::text(prompt.clone())),
            (None, Some(path)) => Input::image_path(path),
            (None, None) => Err(MeshCacheError::config("either --prompt or --image is required")),
        }
    }
}

/// Comandos disponíveis.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Grava uma configuração padrão no diretório de destino.
    Init {
        /// Diretório de destino (padrão: diretório atual).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Gera um modelo, servindo do cache quando possível.
    Generate {
        #[command(flatten)]
        input: InputArgs,

        /// Sobrescreve generation.output_dir.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Consulta uma entrada no cache sem gerar.
    Lookup {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Registra um artefato existente no cache.
    Store {
        #[command(flatten)]
        input: InputArgs,

        /// Arquivo de modelo produzido para a entrada.
        #[arg(short, long)]
        artifact: PathBuf,

        /// Nota de qualidade; o artefato é avaliado quando omitida.
        #[arg(long)]
        quality: Option<f64>,

        /// Custo de geração em segundos.
        #[arg(long, default_value_t = 0.0)]
        cost: f64,
    },

    /// Pontua um arquivo de modelo.
    Evaluate {
        /// Arquivo de modelo (.obj, .gltf, .glb).
        artifact: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        /// Id da requisição gravado com a avaliação.
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Registra a nota 1-5 de um usuário para uma requisição.
    Feedback {
        /// Id da requisição impresso por `generate`.
        request_id: String,

        /// Nota, de 1 a 5.
        #[arg(allow_negative_numbers = true)]
        rating: i64,

        /// Comentário livre.
        #[arg(long, default_value = "")]
        text: String,

        /// Categorias separadas por vírgula.
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
    },

    /// Mostra estatísticas do cache e da avaliação.
    Stats,

    /// Mostra o relatório de qualidade.
    Report,

    /// Remove registros ociosos e aplica o orçamento de tamanho.
    Evict {
        /// Sobrescreve cache.max_age_days.
        #[arg(long)]
        max_age_days: Option<u64>,

        /// Sobrescreve cache.max_size_gb.
        #[arg(long)]
        max_size_gb: Option<f64>,
    },

    /// Mostra versão.
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_input_group_is_exclusive() {
        assert!(Cli::try_parse_from(["meshcache", "lookup"]).is_err());
        assert!(
            Cli::try_parse_from(["meshcache", "lookup", "-p", "a cube", "-i", "x.png"]).is_err()
        );

        let cli = Cli::try_parse_from(["meshcache", "--json", "lookup", "-p", "a cube"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Lookup { input } => {
                assert_eq!(input.to_input().unwrap(), Input::text("a cube"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_feedback_categories() {
        let cli = Cli::try_parse_from([
            "meshcache",
            "feedback",
            "r1",
            "4",
            "--categories",
            "geometry,texture",
        ])
        .unwrap();
        match cli.command {
            Commands::Feedback {
                rating, categories, ..
            } => {
                assert_eq!(rating, 4);
                assert_eq!(categories, vec!["geometry", "texture"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
