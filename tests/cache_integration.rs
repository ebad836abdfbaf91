//! Testes de integração do cache por similaridade sobre os dois backends do índice.

use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use meshcache::cache::{fingerprint, CacheCoordinator, CacheResult, MissReason};
use meshcache::features::FeatureExtractor;
use meshcache::index::{MemoryIndex, SimilarityIndex, SqliteIndex};
use meshcache::types::config::{CacheConfig, IndexBackend};
use meshcache::Input;
use tempfile::TempDir;

fn config(dir: &TempDir, backend: IndexBackend) -> CacheConfig {
    CacheConfig::default()
        .with_dir(dir.path().join("cache"))
        .with_backend(backend)
        .with_similarity_threshold(0.8)
}

fn png(color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 64, Rgb(color));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn both_backends(dir: &TempDir) -> Vec<CacheCoordinator> {
    vec![
        CacheCoordinator::open(config(dir, IndexBackend::Sqlite)).unwrap(),
        CacheCoordinator::open(config(dir, IndexBackend::Memory)).unwrap(),
    ]
}

#[test]
fn test_exact_then_similar_then_miss() {
    let dir = TempDir::new().unwrap();

    for cache in both_backends(&dir) {
        cache
            .try_store(&Input::text("a red cube"), "models/cube.obj", 0.9, 12.0)
            .unwrap()
            .unwrap();

        let exact = cache.lookup(&Input::text("a red cube"));
        assert!(matches!(exact, CacheResult::HitExact(_)));
        assert_eq!(exact.artifact_reference(), Some("models/cube.obj"));
        assert_eq!(exact.similarity(), Some(1.0));

        let similar = cache.lookup(&Input::text("a small red cube"));
        match &similar {
            CacheResult::HitSimilar { hit, similarity } => {
                assert_eq!(hit.artifact_reference(), "models/cube.obj");
                assert!(*similarity >= 0.8 && *similarity < 1.0);
            }
            other => panic!("expected similar hit, got {:?}", other),
        }

        let miss = cache.lookup(&Input::text("a tall blue skyscraper"));
        assert_eq!(miss, CacheResult::Miss(MissReason::NotFound));

        let stats = cache.stats();
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.similar_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.text.entries, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}

#[test]
fn test_hits_touch_the_record() {
    let dir = TempDir::new().unwrap();
    let cache = CacheCoordinator::open(config(&dir, IndexBackend::Sqlite)).unwrap();

    cache
        .try_store(&Input::text("a red cube"), "cube.obj", 0.9, 1.0)
        .unwrap();
    cache.lookup(&Input::text("a red cube"));
    cache.lookup(&Input::text("a small red cube"));

    // Gravado com um acesso, mais um por hit.
    let stats = cache.stats();
    assert!((stats.text.avg_access_count - 3.0).abs() < 1e-9);
}

#[test]
fn test_sqlite_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let cache = CacheCoordinator::open(config(&dir, IndexBackend::Sqlite)).unwrap();
        cache.store(&Input::text("a wooden chair"), "chair.obj", 0.7, 30.0);
    }

    let cache = CacheCoordinator::open(config(&dir, IndexBackend::Sqlite)).unwrap();
    let result = cache.lookup(&Input::text("a wooden chair"));
    assert!(matches!(result, CacheResult::HitExact(_)));
    assert_eq!(result.hit().unwrap().quality_score(), 0.7);
}

#[test]
fn test_store_replaces_same_fingerprint() {
    let dir = TempDir::new().unwrap();

    for cache in both_backends(&dir) {
        let input = Input::text("a stone bridge");
        cache.store(&input, "first.obj", 0.5, 1.0);
        cache.store(&input, "second.obj", 0.8, 1.0);

        let result = cache.lookup(&input);
        assert_eq!(result.artifact_reference(), Some("second.obj"));
        assert_eq!(cache.stats().text.entries, 1);
    }
}

#[test]
fn test_image_modality_is_separate() {
    let dir = TempDir::new().unwrap();
    let cache = CacheCoordinator::open(config(&dir, IndexBackend::Memory)).unwrap();

    let red = Input::image_bytes(png([220, 20, 20]));
    cache.try_store(&red, "red.obj", 0.6, 5.0).unwrap();

    assert!(matches!(cache.lookup(&red), CacheResult::HitExact(_)));
    assert!(!cache.lookup(&Input::text("red")).is_hit());

    let stats = cache.stats();
    assert_eq!(stats.image.entries, 1);
    assert_eq!(stats.text.entries, 0);
}

#[test]
fn test_unreadable_image_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let cache = CacheCoordinator::open(config(&dir, IndexBackend::Memory)).unwrap();

    let garbage = Input::image_bytes(vec![0u8, 1, 2, 3]);
    assert_eq!(cache.lookup(&garbage), CacheResult::Miss(MissReason::NoVector));
    assert!(cache.try_store(&garbage, "x.obj", 0.5, 1.0).is_err());
}

#[test]
fn test_disabled_cache_passes_through() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, IndexBackend::Memory);
    cfg.enabled = false;
    let cache = CacheCoordinator::open(cfg).unwrap();

    assert!(cache.try_store(&Input::text("a cube"), "c.obj", 0.5, 1.0).unwrap().is_none());
    assert_eq!(
        cache.lookup(&Input::text("a cube")),
        CacheResult::Miss(MissReason::Disabled)
    );
}

#[test]
fn test_size_eviction_keeps_recent_artifacts() {
    let dir = TempDir::new().unwrap();
    let cache = CacheCoordinator::open(config(&dir, IndexBackend::Sqlite)).unwrap();

    let old = dir.path().join("old.obj");
    let new = dir.path().join("new.obj");
    std::fs::write(&old, vec![b'x'; 600]).unwrap();
    std::fs::write(&new, vec![b'x'; 600]).unwrap();

    cache.store(&Input::text("an old lamp"), &old.display().to_string(), 0.5, 1.0);
    std::thread::sleep(Duration::from_millis(5));
    cache.store(&Input::text("a new sofa"), &new.display().to_string(), 0.5, 1.0);

    let report = cache.evict(Duration::from_secs(3600), 1000).unwrap();
    assert_eq!(report.expired, 0);
    assert_eq!(report.over_budget, 1);
    assert_eq!(report.bytes_before, 1200);
    assert_eq!(report.bytes_after, 600);

    assert!(!cache.lookup(&Input::text("an old lamp")).is_hit());
    assert!(cache.lookup(&Input::text("a new sofa")).is_hit());
    // Arquivos nunca são apagados.
    assert!(old.exists());
}

#[test]
fn test_feature_model_change_wipes_modality() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.db");

    {
        let index: Arc<dyn SimilarityIndex> = Arc::new(SqliteIndex::open(&path).unwrap());
        let cache = CacheCoordinator::with_parts(
            config(&dir, IndexBackend::Sqlite),
            index,
            FeatureExtractor::new(256),
        );
        cache.store(&Input::text("a red cube"), "cube.obj", 0.9, 1.0);
        assert_eq!(cache.stats().text.entries, 1);
    }

    let index: Arc<dyn SimilarityIndex> = Arc::new(SqliteIndex::open(&path).unwrap());
    let cache = CacheCoordinator::with_parts(
        config(&dir, IndexBackend::Sqlite),
        index,
        FeatureExtractor::new(512),
    );
    assert_eq!(cache.stats().text.entries, 0);
    assert!(!cache.lookup(&Input::text("a red cube")).is_hit());
}

#[test]
fn test_memory_and_fingerprint_agree() {
    let index = MemoryIndex::new();
    let input = Input::text("a red cube");
    assert_eq!(fingerprint(&input), fingerprint(&Input::text("a red cube")));
    assert_ne!(fingerprint(&input), fingerprint(&Input::text("a red cube ")));
    assert!(index
        .exact_lookup(input.modality(), &fingerprint(&input))
        .unwrap()
        .is_none());
}

#[test]
fn test_concurrent_stores_leave_one_record() {
    let dir = TempDir::new().unwrap();
    let input = Input::text("a red cube");

    for cache in both_backends(&dir) {
        let cache = Arc::new(cache);
        let artifacts: Vec<String> = (0..8).map(|i| format!("cube-{}.obj", i)).collect();

        let writers: Vec<_> = artifacts
            .iter()
            .cloned()
            .map(|artifact| {
                let cache = Arc::clone(&cache);
                let input = input.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        cache.store(&input, &artifact, 0.7, 1.0);
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let input = input.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        // Uma gravação pode cair entre as duas fases, então qualquer
                        // tipo de hit serve.
                        match cache.lookup(&input) {
                            CacheResult::Miss(reason) => assert_eq!(reason, MissReason::NotFound),
                            hit => assert!(hit.artifact_reference().unwrap().starts_with("cube-")),
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.text.entries, 1);
        assert_eq!(stats.store_failures, 0);

        let result = cache.lookup(&input);
        assert!(matches!(result, CacheResult::HitExact(_)));
        let artifact = result.artifact_reference().unwrap().to_string();
        assert!(artifacts.contains(&artifact));
    }
}
