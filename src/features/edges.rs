//! Detecção de bordas Canny sobre buffers em tons de cinza de 8 bits.

use std::collections::VecDeque;

const EDGE: u8 = 255;

// tan(22.5°) e tan(67.5°), usados para agrupar direções do gradiente.
const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

/// Executa Canny com operador Sobel 3x3 e magnitude de gradiente L1.
///
/// `pixels` é row-major com `width * height` elementos. Retorna um buffer do
/// mesmo formato com 255 nas bordas e 0 no restante.
pub fn canny(pixels: &[u8], width: usize, height: usize, low: i32, high: i32) -> Vec<u8> {
    let len = width * height;
    let mut edges = vec![0u8; len];
    if width < 3 || height < 3 || pixels.len() != len {
        return edges;
    }

    let (gx, gy) = sobel(pixels, width, height);
    let magnitude: Vec<i32> = gx.iter().zip(&gy).map(|(x, y)| x.abs() + y.abs()).collect();

    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };

    // 0 = suprimido, 1 = candidato fraco, 2 = forte
    let mut class = vec![0u8; len];
    let mut strong = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }

            let dx = gx[i] as f32;
            let dy = gy[i] as f32;
            let (xi, yi) = (x as isize, y as isize);
            let ((ax, ay), (bx, by)) = if dy.abs() < dx.abs() * TAN_22_5 {
                ((xi - 1, yi), (xi + 1, yi))
            } else if dy.abs() > dx.abs() * TAN_67_5 {
                ((xi, yi - 1), (xi, yi + 1))
            } else if (dx > 0.0) == (dy > 0.0) {
                ((xi - 1, yi - 1), (xi + 1, yi + 1))
            } else {
                ((xi + 1, yi - 1), (xi - 1, yi + 1))
            };

            if m > mag_at(ax, ay) && m >= mag_at(bx, by) {
                if m > high {
                    class[i] = 2;
                    strong.push_back(i);
                } else {
                    class[i] = 1;
                }
            }
        }
    }

    // Histerese: expande bordas fortes para candidatos fracos 8-conectados.
    while let Some(i) = strong.pop_front() {
        if edges[i] == EDGE {
            continue;
        }
        edges[i] = EDGE;

        let (x, y) = ((i % width) as isize, (i / width) as isize);
        for ny in (y - 1)..=(y + 1) {
            for nx in (x - 1)..=(x + 1) {
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if class[n] == 1 && edges[n] != EDGE {
                    class[n] = 2;
                    strong.push_back(n);
                }
            }
        }
    }

    edges
}

/// Derivadas Sobel 3x3 com bordas reflect-101.
fn sobel(pixels: &[u8], width: usize, height: usize) -> (Vec<i32>, Vec<i32>) {
    let reflect = |v: isize, n: usize| -> usize {
        let n = n as isize;
        let r = if v < 0 {
            -v
        } else if v >= n {
            2 * n - 2 - v
        } else {
            v
        };
        r as usize
    };
    let at = |x: isize, y: isize| -> i32 {
        i32::from(pixels[reflect(y, height) * width + reflect(x, width)])
    };

    let mut gx = vec![0i32; width * height];
    let mut gy = vec![0i32; width * height];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let i = y as usize * width + x as usize;
            gx[i] = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            gy[i] = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
        }
    }
    (gx, gy)
}
