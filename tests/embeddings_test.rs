use std::collections::HashSet;

use tagger::{Architecture, Example, Network, Profiler, TaggerConfig, TaggerError, TrainConfig, DEFAULT_WIDTH};

fn training_set() -> Vec<Example> {
    vec![
        Example::new(vec![1, 2, 3], vec![0, 1, 0]).unwrap(),
        Example::new(vec![4, 5], vec![1, 1]).unwrap(),
        Example::new(vec![3, 1, 9, 9], vec![0, 0, 2, 2]).unwrap(),
    ]
}

fn model(architecture: Architecture) -> Network {
    let config = TaggerConfig { architecture, ..TaggerConfig::default() };
    Network::new(&config, 3, Some(11)).unwrap()
}

#[test]
fn test_register_same_id_twice() {
    let mut model = model(Architecture::Encode);

    assert!(model.add_vector(42).unwrap());
    let before = model.vectors().unwrap().get(42).unwrap().to_owned();
    assert!(!model.add_vector(42).unwrap());

    let table = model.vectors().unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(42).unwrap(), before);
}

#[test]
fn test_every_training_token_registered() {
    for architecture in [Architecture::Encode, Architecture::Embed] {
        let mut model = model(architecture);
        let data = training_set();

        let added = model.register_vectors(&data).unwrap();

        let distinct: HashSet<u64> = data.iter().flat_map(|eg| eg.tokens.iter().copied()).collect();
        assert_eq!(added, distinct.len());
        let table = model.vectors().unwrap();
        for id in &distinct {
            assert!(table.contains(*id), "token {id} missing");
            assert_eq!(table.get(*id).unwrap().len(), DEFAULT_WIDTH);
            assert!(table.gradient(*id).unwrap().iter().all(|&g| g == 0.0));
        }
        assert_eq!(table.ids().collect::<HashSet<_>>(), distinct);
    }
}

#[test]
fn test_registration_is_idempotent_over_dataset() {
    let mut model = model(Architecture::Embed);
    let data = training_set();
    model.register_vectors(&data).unwrap();
    let size = model.vectors().unwrap().len();

    assert_eq!(model.register_vectors(&data).unwrap(), 0);
    assert_eq!(model.vectors().unwrap().len(), size);
}

#[test]
fn test_registration_needs_vector_table() {
    use tagger::LayerConfig;
    let configs = [
        LayerConfig::ReLu { nr_in: 4, nr_out: 4 },
        LayerConfig::Softmax { nr_in: 4, nr_out: 2 },
    ];
    let mut model = Network::from_configs(&configs, Some(0)).unwrap();
    assert!(matches!(model.add_vector(1), Err(TaggerError::NoVectorTable(_))));
}

#[test]
fn test_vector_added_mid_training_is_trained() {
    let train = training_set();
    for architecture in [Architecture::Encode, Architecture::Embed] {
        let mut model = model(architecture);
        model.register_vectors(&train).unwrap();
        let config = TrainConfig { dropout: 0.0, seed: Some(5), ..TrainConfig::default() };

        model
            .begin_training(&config, |model, trainer, optimizer| {
                let mut profiler = Profiler::disabled();
                let batch: Vec<&Example> = train.iter().collect();
                trainer.update(model, optimizer, &batch, &mut profiler)?;

                assert!(model.add_vector(77)?);
                let before = model.vectors()?.get(77).unwrap().to_owned();
                let known = model.vectors()?.get(1).unwrap().to_owned();

                let late = vec![Example::new(vec![1, 77, 2], vec![0, 2, 1])?];
                let late_batch: Vec<&Example> = late.iter().collect();
                trainer.update(model, optimizer, &late_batch, &mut profiler)?;

                let table = model.vectors()?;
                assert_eq!(table.len(), 7);
                assert_ne!(table.get(77).unwrap(), before);
                assert_ne!(table.get(1).unwrap(), known);
                Ok(())
            })
            .unwrap();
    }
}
