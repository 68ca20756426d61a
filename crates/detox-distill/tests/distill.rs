use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use detox_core::{
    BatchTensors, Classifier, CoreResult, LstmClassifier, LstmClassifierConfig, Tokenizer, TrainableClassifier,
};
use detox_distill::{distillation_loss, train, DistillConfig, DistillError, Distiller};

/// Teacher that returns the same logits for every input.
struct FixedTeacher {
    logits: Tensor,
    device: Device,
}

impl FixedTeacher {
    fn new(row: &[f32]) -> Self {
        Self { logits: Tensor::new(row, &Device::Cpu).unwrap(), device: Device::Cpu }
    }
}

impl Classifier for FixedTeacher {
    fn num_labels(&self) -> usize {
        self.logits.dims1().unwrap()
    }

    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor> {
        let b = batch.input_ids.dim(0)?;
        Ok(self.logits.unsqueeze(0)?.broadcast_as((b, self.num_labels()))?.contiguous()?)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Student whose logits are a single trainable bias vector.
struct BiasStudent {
    bias: Var,
    device: Device,
}

impl BiasStudent {
    fn new(init: &[f32]) -> Self {
        Self { bias: Var::new(init, &Device::Cpu).unwrap(), device: Device::Cpu }
    }

    fn values(&self) -> Vec<f32> {
        self.bias.as_tensor().to_vec1::<f32>().unwrap()
    }

    /// `[1, C]` logits for one input.
    fn row(&self) -> Tensor {
        self.bias.as_tensor().unsqueeze(0).unwrap()
    }
}

impl Classifier for BiasStudent {
    fn num_labels(&self) -> usize {
        self.bias.dims1().unwrap()
    }

    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor> {
        let b = batch.input_ids.dim(0)?;
        Ok(self.bias.as_tensor().unsqueeze(0)?.broadcast_as((b, self.num_labels()))?.contiguous()?)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl TrainableClassifier for BiasStudent {
    fn trainable_vars(&self) -> Vec<Var> {
        vec![self.bias.clone()]
    }

    fn save(&self, _dir: &Path) -> CoreResult<()> {
        Ok(())
    }
}

fn tokenizer() -> Tokenizer {
    Tokenizer::from_vocab(&["this", "app", "is", "garbage", "great"]).unwrap()
}

fn one_step(lr: f64) -> DistillConfig {
    DistillConfig { epochs: 1, batch_size: 1, learning_rate: lr, temperature: 2.0, max_seq_len: 8, ..Default::default() }
}

fn lstm(vocab_size: usize) -> LstmClassifier {
    LstmClassifier::new(
        LstmClassifierConfig { vocab_size, embed_dim: 8, hidden_dim: 8, num_labels: 2, pad_token_id: 0 },
        &Device::Cpu,
    )
    .unwrap()
}

fn snapshot(vars: &[Var]) -> Vec<Vec<f32>> {
    vars.iter()
        .map(|v| v.as_tensor().flatten_all().unwrap().to_dtype(DType::F32).unwrap().to_vec1::<f32>().unwrap())
        .collect()
}

#[test]
fn single_step_strictly_decreases_loss() {
    let teacher = FixedTeacher::new(&[2.0, -1.0]);
    let mut student = BiasStudent::new(&[0.0, 0.0]);
    let teacher_row = teacher.logits.unsqueeze(0).unwrap();

    let before = distillation_loss(&student.row(), &teacher_row, 2.0).unwrap().to_scalar::<f32>().unwrap();
    assert!(before > 0.0, "initial loss must be positive, got {before}");

    let stats = train(&teacher, &mut student, &tokenizer(), &["this app is garbage".to_string()], &one_step(0.1))
        .unwrap();
    assert_eq!(stats.total_steps, 1);
    assert!((stats.final_loss - before).abs() < 1e-6, "reported loss is the pre-update loss");

    let after = distillation_loss(&student.row(), &teacher_row, 2.0).unwrap().to_scalar::<f32>().unwrap();
    assert!(after < before, "loss did not decrease: {before} -> {after}");

    // The student moved towards the teacher's preferred class.
    let b = student.values();
    assert!(b[0] > b[1]);
}

#[test]
fn empty_samples_are_rejected_and_student_untouched() {
    let teacher = FixedTeacher::new(&[2.0, -1.0]);
    let mut student = BiasStudent::new(&[0.25, -0.5]);

    let err = train(&teacher, &mut student, &tokenizer(), &[], &DistillConfig::default()).unwrap_err();
    assert!(matches!(err, DistillError::Configuration(_)));
    assert_eq!(student.values(), vec![0.25, -0.5]);
}

#[test]
fn invalid_config_is_rejected_before_any_step() {
    let teacher = FixedTeacher::new(&[2.0, -1.0]);
    let mut student = BiasStudent::new(&[0.0, 0.0]);
    let samples = vec!["great app".to_string()];

    for config in [
        DistillConfig { epochs: 0, ..Default::default() },
        DistillConfig { temperature: 0.0, ..Default::default() },
        DistillConfig { learning_rate: -1e-5, ..Default::default() },
    ] {
        let err = train(&teacher, &mut student, &tokenizer(), &samples, &config).unwrap_err();
        assert!(matches!(err, DistillError::Configuration(_)));
    }
    assert_eq!(student.values(), vec![0.0, 0.0]);
}

#[test]
fn label_count_mismatch_is_a_configuration_error() {
    let teacher = FixedTeacher::new(&[2.0, -1.0, 0.5]);
    let mut student = BiasStudent::new(&[0.0, 0.0]);
    let err = train(&teacher, &mut student, &tokenizer(), &["great".to_string()], &DistillConfig::default())
        .unwrap_err();
    assert!(matches!(err, DistillError::Configuration(_)));
}

#[test]
fn single_logit_teacher_is_rejected_and_student_untouched() {
    let teacher = FixedTeacher::new(&[1.5]);
    let mut student = BiasStudent::new(&[0.0]);
    let err = train(&teacher, &mut student, &tokenizer(), &["this app is garbage".to_string()], &one_step(0.1))
        .unwrap_err();
    assert!(matches!(err, DistillError::Configuration(_)));
    assert_eq!(student.values(), vec![0.0]);
}

#[test]
fn teacher_parameters_are_bit_identical_after_training() {
    let tok = tokenizer();
    // A teacher that owns Vars: only the student's Vars may be updated.
    let teacher = lstm(tok.vocab_size());
    let mut student = lstm(tok.vocab_size());

    let teacher_before = snapshot(&teacher.trainable_vars());
    let student_before = snapshot(&student.trainable_vars());

    let samples: Vec<String> =
        ["this app is garbage", "this app is great", "garbage", "great great app"].iter().map(|s| s.to_string()).collect();
    let config = DistillConfig { epochs: 2, batch_size: 2, learning_rate: 1e-2, max_seq_len: 6, ..Default::default() };
    let stats = train(&teacher, &mut student, &tok, &samples, &config).unwrap();

    assert_eq!(stats.total_steps, 4);
    assert_eq!(stats.epoch_losses.len(), 2);
    assert!(stats.epoch_losses.iter().all(|l| l.is_finite() && *l >= 0.0));

    assert_eq!(snapshot(&teacher.trainable_vars()), teacher_before);
    assert_ne!(snapshot(&student.trainable_vars()), student_before);
}

#[test]
fn same_seed_gives_same_losses() {
    let teacher = FixedTeacher::new(&[1.0, -1.0]);
    let samples: Vec<String> = (0..5).map(|i| format!("this app {i}")).collect();
    let config = DistillConfig { epochs: 2, batch_size: 2, learning_rate: 0.05, max_seq_len: 4, ..Default::default() };

    let mut a = BiasStudent::new(&[0.0, 0.0]);
    let mut b = BiasStudent::new(&[0.0, 0.0]);
    let sa = train(&teacher, &mut a, &tokenizer(), &samples, &config).unwrap();
    let sb = train(&teacher, &mut b, &tokenizer(), &samples, &config).unwrap();
    assert_eq!(sa.epoch_losses, sb.epoch_losses);
    assert_eq!(a.values(), b.values());
}

#[test]
fn distiller_owns_models_and_returns_trained_student() {
    let teacher = FixedTeacher::new(&[2.0, -1.0]);
    let student = BiasStudent::new(&[0.0, 0.0]);
    let mut distiller = Distiller::new(teacher, student, tokenizer(), one_step(0.1));

    let stats = distiller.run(&["this app is great".to_string()]).unwrap();
    assert_eq!(stats.total_steps, 1);
    assert_eq!(distiller.config().temperature, 2.0);

    let student = distiller.into_student();
    assert_ne!(student.values(), vec![0.0, 0.0]);
}
