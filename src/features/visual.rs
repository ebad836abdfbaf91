//! Features de imagem baseadas em descritores de conteúdo.
//!
//! O descritor é barato: histogramas de cor em HSV mais um histograma do mapa
//! de bordas Canny, concatenados e normalizados em L2. Os mesmos bytes sempre
//! produzem o mesmo vetor, bit a bit.

use image::imageops::FilterType;

use crate::{MeshCacheError, MeshCacheResult};

use super::edges::canny;
use super::l2_normalize;

/// Lado do quadrado canônico para o qual toda imagem é redimensionada.
pub const CANONICAL_SIZE: u32 = 224;

const HUE_BINS: usize = 50;
const SATURATION_BINS: usize = 60;
const VALUE_BINS: usize = 60;
const EDGE_BINS: usize = 256;

/// Tamanho de todo vetor de features de imagem.
pub const IMAGE_FEATURE_LEN: usize = HUE_BINS + SATURATION_BINS + VALUE_BINS + EDGE_BINS;

const CANNY_LOW: i32 = 50;
const CANNY_HIGH: i32 = 150;
const NORM_EPSILON: f32 = 1e-8;

/// Extrai descritores de cor + bordas de imagens codificadas.
#[derive(Debug, Clone, Default)]
pub struct ImageFeatureExtractor;

impl ImageFeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Identificador gravado com os vetores de imagem no índice.
    pub fn model_id(&self) -> &'static str {
        "hsv-canny-v1-224"
    }

    pub fn dimension(&self) -> usize {
        IMAGE_FEATURE_LEN
    }

    /// Decodifica `bytes` e calcula o descritor.
    pub fn extract(&self, bytes: &[u8]) -> MeshCacheResult<Vec<f32>> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| MeshCacheError::unreadable(format!("cannot decode image: {}", e)))?;

        let rgb = decoded
            .resize_exact(CANONICAL_SIZE, CANONICAL_SIZE, FilterType::Triangle)
            .to_rgb8();

        let side = CANONICAL_SIZE as usize;
        let mut hue = [0f32; HUE_BINS];
        let mut saturation = [0f32; SATURATION_BINS];
        let mut value = [0f32; VALUE_BINS];
        let mut gray = Vec::with_capacity(side * side);

        for pixel in rgb.pixels() {
            let [r, g, b] = pixel.0;
            let (h, s, v) = rgb_to_hsv(r, g, b);
            hue[usize::from(h) * HUE_BINS / 180] += 1.0;
            saturation[usize::from(s) * SATURATION_BINS / 256] += 1.0;
            value[usize::from(v) * VALUE_BINS / 256] += 1.0;
            gray.push(luma(r, g, b));
        }

        let edges = canny(&gray, side, side, CANNY_LOW, CANNY_HIGH);
        let mut edge_hist = [0f32; EDGE_BINS];
        for p in &edges {
            edge_hist[usize::from(*p)] += 1.0;
        }

        let mut features = Vec::with_capacity(IMAGE_FEATURE_LEN);
        features.extend_from_slice(&hue);
        features.extend_from_slice(&saturation);
        features.extend_from_slice(&value);
        features.extend_from_slice(&edge_hist);

        l2_normalize(&mut features, NORM_EPSILON);
        Ok(features)
    }
}

/// HSV de 8 bits: matiz em [0, 180), saturação e valor em [0, 255].
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    // 359.x / 2 arredonda para 180, que volta ao vermelho.
    let h = ((h / 2.0).round() as u16 % 180) as u8;
    (h, s.round().min(255.0) as u8, max as u8)
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().min(255.0) as u8
}
