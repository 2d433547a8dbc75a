use candle_core::Device;
use candle_nn::VarMap;
use vrada_core::{ModelConfig, ModelKind, SummaryKind, SummaryRecord};
use vrada_learn::summary_writer::SummaryWriter;
use vrada_learn::synthetic::{generate_domain_pair, SeriesDataset, SyntheticConfig};
use vrada_learn::trainer::{evaluate, train, TrainConfig};
use vrada_nn::Model;

const CLASSES: usize = 2;
const FEATURES: usize = 2;

fn domains() -> (SeriesDataset, SeriesDataset) {
    generate_domain_pair(&SyntheticConfig {
        num_samples: 64,
        seq_len: 10,
        num_features: FEATURES,
        num_classes: CLASSES,
        noise: 0.05,
        seed: 11,
        ..SyntheticConfig::default()
    })
    .unwrap()
}

fn build(var_map: &VarMap, kind: ModelKind, adaptation: bool) -> Model {
    let config = ModelConfig {
        kind,
        num_classes: CLASSES,
        num_features: FEATURES,
        adaptation,
        ..ModelConfig::default()
    };
    Model::new_trainable(var_map, &config, &Device::Cpu).unwrap()
}

#[test]
fn source_only_lstm_loss_decreases() {
    let (source, target) = domains();
    let var_map = VarMap::new();
    let model = build(&var_map, ModelKind::Lstm, false);
    let config = TrainConfig {
        steps: 60,
        batch_size: 16,
        learning_rate: 3e-3,
        keep_prob: 1.0,
        anneal_learning_rate: false,
        eval_interval: 0,
        summary_interval: 0,
        ..TrainConfig::default()
    };

    let result = train(&model, &var_map, &source, &target, &config, &Device::Cpu, None).unwrap();
    assert_eq!(result.loss_history.len(), 60);
    assert!(result.loss_history.iter().all(|l| l.is_finite()));

    let early: f32 = result.loss_history[..5].iter().sum::<f32>() / 5.0;
    let late: f32 = result.loss_history[55..].iter().sum::<f32>() / 5.0;
    assert!(late < early, "loss did not decrease: early {early}, late {late}");
    assert!(result.last_summaries.is_empty());
}

#[test]
fn adversarial_vrnn_run_writes_summaries() {
    let (source, target) = domains();
    let var_map = VarMap::new();
    let model = build(&var_map, ModelKind::Vrnn, true);

    let dir = std::env::temp_dir().join("vrada_learn_test_training");
    let path = dir.join("summaries.jsonl");
    let _ = std::fs::remove_file(&path);

    let config = TrainConfig {
        steps: 6,
        batch_size: 8,
        eval_interval: 3,
        summary_interval: 3,
        ..TrainConfig::default()
    };
    let result = {
        let mut writer = SummaryWriter::create(&path).unwrap();
        let result = train(
            &model,
            &var_map,
            &source,
            &target,
            &config,
            &Device::Cpu,
            Some(&mut writer),
        )
        .unwrap();
        assert_eq!(writer.written(), 30);
        result
    };

    assert!(result.final_loss.is_finite());
    assert_eq!(result.evaluations.len(), 2);
    for metrics in &result.evaluations {
        assert!((0.0..=1.0).contains(&metrics.source_accuracy));
        let target_accuracy = metrics.target_accuracy.unwrap();
        assert!((0.0..=1.0).contains(&target_accuracy));
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let records: Vec<SummaryRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 30);
    assert!(records.iter().any(|r| r.name == "loss/domain_loss" && r.kind == SummaryKind::Scalar));
    assert!(records.iter().any(|r| r.name == "prior/sigma" && r.kind == SummaryKind::Histogram));
    assert_eq!(records.last().map(|r| r.step), Some(6));

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_dir(&dir);
}

#[test]
fn trained_weights_reload_into_fresh_model() {
    let (source, target) = domains();
    let var_map = VarMap::new();
    let model = build(&var_map, ModelKind::Lstm, true);
    let config = TrainConfig {
        steps: 3,
        batch_size: 8,
        eval_interval: 0,
        summary_interval: 0,
        ..TrainConfig::default()
    };
    train(&model, &var_map, &source, &target, &config, &Device::Cpu, None).unwrap();
    let before = evaluate(&model, &target, 1, 16, &Device::Cpu).unwrap();

    let dir = std::env::temp_dir().join("vrada_learn_test_reload");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("weights.safetensors");
    var_map.save(&path).unwrap();

    let mut fresh_map = VarMap::new();
    let fresh = build(&fresh_map, ModelKind::Lstm, true);
    fresh_map.load(&path).unwrap();
    let after = evaluate(&fresh, &target, 1, 16, &Device::Cpu).unwrap();
    assert_eq!(before, after);

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_dir(&dir);
}
