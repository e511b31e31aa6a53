use std::io::Write;

use tagger::{
    train_tagger, Activation, Architecture, ConllDataset, DatasetProvider, Example, Network, OptimizerConfig, Profiler,
    TaggerConfig, TaggerError, TrainConfig, VectorTable,
};
use tempfile::tempdir;

/// Tag of each token depends only on the token itself.
fn toy_corpus(n: usize) -> Vec<Example> {
    (0..n)
        .map(|i| {
            let len = 3 + i % 5;
            let tokens: Vec<u64> = (0..len).map(|j| ((i * 7 + j * 3) % 12) as u64).collect();
            let tags: Vec<usize> = tokens.iter().map(|&t| (t % 3) as usize).collect();
            Example::new(tokens, tags).unwrap()
        })
        .collect()
}

fn train_config(epochs: usize) -> TrainConfig {
    TrainConfig {
        nb_epoch: epochs,
        batch_size: 4,
        dropout: 0.0,
        seed: Some(42),
        optimizer: OptimizerConfig { learn_rate: 0.01, ..OptimizerConfig::default() },
        ..TrainConfig::default()
    }
}

#[test]
fn test_training_reduces_loss() {
    let train = toy_corpus(40);
    let check = toy_corpus(10);
    for architecture in [Architecture::Encode, Architecture::Embed] {
        let model_config = TaggerConfig { architecture, width: 16, ..TaggerConfig::default() };
        let mut profiler = Profiler::disabled();

        let (model, reports) =
            train_tagger(&model_config, &train_config(8), &train, &check, 3, &mut profiler).unwrap();

        assert_eq!(reports.len(), 8);
        let first = &reports[0];
        let last = &reports[reports.len() - 1];
        assert!(last.loss < first.loss, "{architecture:?}: {} !< {}", last.loss, first.loss);
        assert!(last.learn_rate < 0.01);
        assert!(last.averaged_loss.is_finite() && last.averaged_loss > 0.0);
        assert!((0.0..=1.0).contains(&last.accuracy));
        assert_eq!(model.nr_class(), 3);
    }
}

fn has_gradient(table: &VectorTable) -> bool {
    table
        .ids()
        .any(|id| table.gradient(id).is_some_and(|g| g.iter().any(|&x| x != 0.0)))
}

#[test]
fn test_begin_training_clears_gradients_on_error() {
    let train = toy_corpus(4);
    let mut model = Network::new(&TaggerConfig::default(), 3, Some(1)).unwrap();
    model.register_vectors(&train).unwrap();

    let result: Result<(), TaggerError> = model.begin_training(&train_config(1), |model, trainer, _optimizer| {
        let (input, truth) = Activation::from_examples(&train, trainer.ops);
        let (guess, backprop) = model.begin_update(&input, 0.0)?;
        let (gradient, _) = trainer.get_gradient(&guess, &truth)?;
        model.backward(backprop, &gradient)?;
        assert!(has_gradient(model.vectors()?));
        // bail out before the gradients are applied
        Err(TaggerError::Config("interrupted".to_string()))
    });

    assert!(matches!(result, Err(TaggerError::Config(_))));
    assert!(!has_gradient(model.vectors().unwrap()));
}

#[test]
fn test_tag_out_of_range_aborts_training() {
    let train = toy_corpus(4);
    let mut model = Network::new(&TaggerConfig::default(), 3, Some(1)).unwrap();
    model.register_vectors(&train).unwrap();

    let result: Result<(), TaggerError> = model.begin_training(&train_config(1), |model, trainer, optimizer| {
        let mut profiler = Profiler::disabled();
        // gold tag outside the 3 classes
        let bad = vec![Example::new(vec![1], vec![7]).unwrap()];
        let bad_batch: Vec<&Example> = bad.iter().collect();
        trainer.update(model, optimizer, &bad_batch, &mut profiler).map(|_| ())
    });

    assert!(matches!(result, Err(TaggerError::TagOutOfRange { tag: 7, nr_class: 3 })));
}

#[test]
fn test_invalid_train_config_is_rejected() {
    let mut model = Network::new(&TaggerConfig::default(), 3, Some(1)).unwrap();
    let config = TrainConfig { batch_size: 0, ..TrainConfig::default() };
    let result = model.begin_training(&config, |_, _, _| Ok(()));
    assert!(matches!(result, Err(TaggerError::Config(_))));
}

#[test]
fn test_profiler_times_training_phases() {
    let train = toy_corpus(8);
    let mut profiler = Profiler::new(true);
    train_tagger(&TaggerConfig::default(), &train_config(1), &train, &train, 3, &mut profiler).unwrap();

    for section in ["flatten", "forward", "gradient", "backward+update", "score"] {
        assert!(profiler.get(section).is_some(), "{section} not timed");
    }
    assert_eq!(profiler.get("forward").unwrap().calls, 2);
}

const TRAIN_CONLLU: &str = "# sent_id = 1
1\tEl\tel\tDET\t_\t_\t2\tdet\t_\t_
2\tgato\tgato\tNOUN\t_\t_\t3\tnsubj\t_\t_
3\tcome\tcomer\tVERB\t_\t_\t0\troot\t_\t_

# sent_id = 2
1\tEl\tel\tDET\t_\t_\t2\tdet\t_\t_
2\tperro\tperro\tNOUN\t_\t_\t3\tnsubj\t_\t_
3-4\tdel\t_\t_\t_\t_\t_\t_\t_\t_
3\tde\tde\tADP\t_\t_\t5\tcase\t_\t_
4\tel\tel\tDET\t_\t_\t5\tdet\t_\t_
5\tgato\tgato\tNOUN\t_\t_\t2\tnmod\t_\t_

";

const DEV_CONLLU: &str = "1\tEl\tel\tDET\t_\t_\t2\tdet\t_\t_
2\tpez\tpez\tNOUN\t_\t_\t0\troot\t_\t_
";

#[test]
fn test_conll_dataset_end_to_end() {
    let dir = tempdir().unwrap();
    let train_path = dir.path().join("train.conllu");
    let dev_path = dir.path().join("dev.conllu");
    std::fs::File::create(&train_path).unwrap().write_all(TRAIN_CONLLU.as_bytes()).unwrap();
    std::fs::File::create(&dev_path).unwrap().write_all(DEV_CONLLU.as_bytes()).unwrap();

    let dataset = ConllDataset::new(&train_path, &dev_path, 2).load().unwrap();

    // DET, NOUN, VERB, ADP in first-seen order
    assert_eq!(dataset.nr_class, 4);
    assert_eq!(dataset.tags.decode(3), Some("ADP"));
    // "El" and "gato" occur twice; everything else is out of vocabulary
    assert_eq!(dataset.vocab.words, vec!["El", "gato"]);
    let oov = dataset.vocab.oov();
    assert_eq!(dataset.train[0].tokens, vec![0, 1, oov]);
    assert_eq!(dataset.train[1].tokens.len(), 5);
    assert_eq!(dataset.check[0].tokens, vec![0, oov]);
    assert_eq!(dataset.check[0].tags, vec![0, 1]);

    let (train, check, nr_class) = dataset.into_parts();
    let (_, reports) =
        train_tagger(&TaggerConfig::default(), &train_config(2), &train, &check, nr_class, &mut Profiler::disabled())
            .unwrap();
    assert_eq!(reports.len(), 2);
}

#[test]
fn test_unknown_dev_tag_is_an_error() {
    let dir = tempdir().unwrap();
    let train_path = dir.path().join("train.conllu");
    let dev_path = dir.path().join("dev.conllu");
    std::fs::write(&train_path, TRAIN_CONLLU).unwrap();
    std::fs::write(&dev_path, "1\tRápido\trápido\tADV\t_\t_\t0\troot\t_\t_\n").unwrap();

    let err = ConllDataset::new(&train_path, &dev_path, 1).load().unwrap_err();
    assert!(matches!(err, TaggerError::UnknownTag(tag) if tag == "ADV"));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempdir().unwrap();
    let err = ConllDataset::new(dir.path().join("nope.conllu"), dir.path().join("dev.conllu"), 1)
        .load()
        .unwrap_err();
    assert!(matches!(err, TaggerError::FileNotFound(_)));
}
