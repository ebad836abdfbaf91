//! Entradas aceitas pelo cache e pelo avaliador.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{MeshCacheError, MeshCacheResult};

/// Modalidade da entrada. Cada uma tem sua tabela no índice e seu tamanho de vetor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    /// Todas as modalidades, em ordem fixa.
    pub const ALL: [Modality; 2] = [Modality::Text, Modality::Image];

    /// Nome estável usado em disco.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
        }
    }

    /// Interpreta o nome usado em disco.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" => Some(Modality::Text),
            "image" => Some(Modality::Image),
            _ => None,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conteúdo bruto de uma imagem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    bytes: Vec<u8>,
    source: Option<PathBuf>,
}

impl ImageInput {
    /// Encapsula bytes recebidos de um upload.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            source: None,
        }
    }

    /// Lê um arquivo de imagem. Arquivo ausente é uma entrada ilegível.
    pub fn from_path(path: impl AsRef<Path>) -> MeshCacheResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            MeshCacheError::unreadable(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self {
            bytes,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// De onde vieram os bytes, quando conhecido.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Entrada de uma requisição de geração.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Image(ImageInput),
}

impl Input {
    pub fn text(text: impl Into<String>) -> Self {
        Input::Text(text.into())
    }

    pub fn image_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Input::Image(ImageInput::from_bytes(bytes))
    }

    pub fn image_path(path: impl AsRef<Path>) -> MeshCacheResult<Self> {
        Ok(Input::Image(ImageInput::from_path(path)?))
    }

    pub fn modality(&self) -> Modality {
        match self {
            Input::Text(_) => Modality::Text,
            Input::Image(_) => Modality::Image,
        }
    }

    /// Bytes usados na impressão digital de correspondência exata.
    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            Input::Text(text) => text.as_bytes(),
            Input::Image(image) => image.bytes(),
        }
    }

    /// Descrição legível guardada junto aos registros.
    pub fn label(&self) -> String {
        match self {
            Input::Text(text) => text.clone(),
            Input::Image(image) => match image.source() {
                Some(path) => path.display().to_string(),
                None => format!("<image: {} bytes>", image.bytes().len()),
            },
        }
    }

    /// Rótulo curto para linhas de log.
    pub fn preview(&self) -> String {
        let label = self.label();
        if label.chars().count() <= 50 {
            label
        } else {
            let cut: String = label.chars().take(50).collect();
            format!("{}...", cut)
        }
    }
}
