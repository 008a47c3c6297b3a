use anyhow::{Context, Result, bail};
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::game::Action;
use crate::{FEATURE_DIM, Features};

pub type ActionValues = [f32; Action::COUNT];

/// Function approximator from features to one score per action.
pub trait Estimator {
    fn is_fit(&self) -> bool;

    fn predict(&self, features: &Features) -> Result<ActionValues>;

    /// Fit on a full batch, replacing the current parameters.
    fn fit(&mut self, features: &[Features], targets: &[ActionValues]) -> Result<()>;

    /// Persist to `path`, overwriting whatever is there.
    fn save(&self, path: &Path) -> Result<()>;
}

// =============================================================================
// Regressor Hyperparameters
// =============================================================================

#[derive(Debug, Clone)]
pub struct RegressorConfig {
    pub hidden_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            epochs: 150,
            learning_rate: 1e-2,
            weight_decay: 1e-4,
        }
    }
}

// =============================================================================
// Network (candle)
// =============================================================================

/// FEATURE_DIM → hidden (ReLU) → Action::COUNT
struct QNet {
    hidden: Linear,
    out: Linear,
}

impl QNet {
    fn new(vs: VarBuilder, hidden_size: usize) -> Result<Self> {
        let hidden = candle_nn::linear(FEATURE_DIM, hidden_size, vs.pp("hidden"))?;
        let out = candle_nn::linear(hidden_size, Action::COUNT, vs.pp("out"))?;
        Ok(Self { hidden, out })
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.hidden.forward(x)?.relu()?;
        self.out.forward(&h)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegressorMeta {
    fitted: bool,
    hidden_size: usize,
    feature_dim: usize,
    action_count: usize,
}

fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

// =============================================================================
// Regressor
// =============================================================================

pub struct QRegressor {
    varmap: VarMap,
    net: QNet,
    device: Device,
    config: RegressorConfig,
    fitted: bool,
}

impl QRegressor {
    pub fn new(config: RegressorConfig) -> Result<Self> {
        let device = Device::Cpu;
        let (varmap, net) = Self::build(&device, config.hidden_size)?;
        Ok(Self {
            varmap,
            net,
            device,
            config,
            fitted: false,
        })
    }

    fn build(device: &Device, hidden_size: usize) -> Result<(VarMap, QNet)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let net = QNet::new(vb, hidden_size)?;
        Ok((varmap, net))
    }

    /// Load weights written by [`Estimator::save`]. The hidden size is taken from
    /// the sidecar, the remaining hyperparameters from `config`.
    pub fn load(path: &Path, mut config: RegressorConfig) -> Result<Self> {
        let meta_file = meta_path(path);
        let file = File::open(&meta_file)
            .with_context(|| format!("Failed to open model metadata {}", meta_file.display()))?;
        let meta: RegressorMeta = serde_json::from_reader(std::io::BufReader::new(file))
            .context("Failed to parse model metadata")?;
        if meta.feature_dim != FEATURE_DIM || meta.action_count != Action::COUNT {
            bail!(
                "model at {} expects {}x{} but this build uses {}x{}",
                path.display(),
                meta.feature_dim,
                meta.action_count,
                FEATURE_DIM,
                Action::COUNT
            );
        }

        config.hidden_size = meta.hidden_size;
        let mut regressor = Self::new(config)?;
        regressor
            .varmap
            .load(path)
            .with_context(|| format!("Failed to load weights from {}", path.display()))?;
        regressor.fitted = meta.fitted;
        debug!(path = %path.display(), fitted = meta.fitted, "model loaded");
        Ok(regressor)
    }

    fn rows_to_tensor<const N: usize>(&self, rows: &[[f32; N]]) -> Result<Tensor> {
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Ok(Tensor::from_vec(flat, (rows.len(), N), &self.device)?)
    }
}

impl Estimator for QRegressor {
    fn is_fit(&self) -> bool {
        self.fitted
    }

    fn predict(&self, features: &Features) -> Result<ActionValues> {
        let x = Tensor::from_slice(features.as_slice(), (1, FEATURE_DIM), &self.device)?;
        let q = self.net.forward(&x)?.squeeze(0)?.to_vec1::<f32>()?;
        q.try_into()
            .map_err(|v: Vec<f32>| anyhow::anyhow!("expected {} outputs, got {}", Action::COUNT, v.len()))
    }

    fn fit(&mut self, features: &[Features], targets: &[ActionValues]) -> Result<()> {
        if features.is_empty() {
            bail!("cannot fit on an empty batch");
        }
        if features.len() != targets.len() {
            bail!(
                "batch mismatch: {} feature rows vs {} target rows",
                features.len(),
                targets.len()
            );
        }

        let x = self.rows_to_tensor(features)?;
        let y = self.rows_to_tensor(targets)?;

        let (varmap, net) = Self::build(&self.device, self.config.hidden_size)?;
        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: self.config.weight_decay,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(varmap.all_vars(), params)?;

        let mut loss = f32::NAN;
        for _ in 0..self.config.epochs {
            let pred = net.forward(&x)?;
            let mse = candle_nn::loss::mse(&pred, &y)?;
            optimizer.backward_step(&mse)?;
            loss = mse.to_scalar::<f32>()?;
        }
        debug!(rows = features.len(), loss, "regressor fit");

        self.varmap = varmap;
        self.net = net;
        self.fitted = true;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create model directory {}", dir.display()))?;
        }
        self.varmap
            .save(path)
            .with_context(|| format!("Failed to save weights to {}", path.display()))?;

        let meta = RegressorMeta {
            fitted: self.fitted,
            hidden_size: self.config.hidden_size,
            feature_dim: FEATURE_DIM,
            action_count: Action::COUNT,
        };
        let meta_file = meta_path(path);
        let file = File::create(&meta_file)
            .with_context(|| format!("Failed to write model metadata {}", meta_file.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &meta)?;
        writer
            .flush()
            .with_context(|| format!("Failed to write model metadata {}", meta_file.display()))?;
        debug!(path = %path.display(), "model saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(seed: f32) -> Features {
        let mut f = [0f32; FEATURE_DIM];
        for (i, v) in f.iter_mut().enumerate() {
            *v = ((i as f32 * 0.37 + seed).sin() + 1.0) / 2.0;
        }
        f
    }

    fn small_config() -> RegressorConfig {
        RegressorConfig {
            hidden_size: 8,
            epochs: 20,
            ..Default::default()
        }
    }

    #[test]
    fn new_regressor_is_not_fit() {
        let reg = QRegressor::new(small_config()).unwrap();
        assert!(!reg.is_fit());
        assert_eq!(reg.predict(&probe(0.0)).unwrap().len(), Action::COUNT);
    }

    #[test]
    fn fit_marks_regressor_fit() {
        let mut reg = QRegressor::new(small_config()).unwrap();
        let xs = vec![probe(0.0), probe(1.0), probe(2.0)];
        let ys = vec![[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]; 3];
        reg.fit(&xs, &ys).unwrap();
        assert!(reg.is_fit());
        assert!(reg.predict(&probe(0.5)).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fit_rejects_bad_batches() {
        let mut reg = QRegressor::new(small_config()).unwrap();
        assert!(reg.fit(&[], &[]).is_err());
        assert!(reg.fit(&[probe(0.0)], &[]).is_err());
        assert!(!reg.is_fit());
    }

    #[test]
    fn save_then_load_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");

        let mut reg = QRegressor::new(small_config()).unwrap();
        reg.fit(&[probe(0.0), probe(3.0)], &[[5.0; Action::COUNT], [-5.0; Action::COUNT]])
            .unwrap();
        reg.save(&path).unwrap();

        let loaded = QRegressor::load(&path, RegressorConfig::default()).unwrap();
        assert!(loaded.is_fit());
        let x = probe(1.25);
        assert_eq!(reg.predict(&x).unwrap(), loaded.predict(&x).unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn full_disk_fails_the_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        std::os::unix::fs::symlink("/dev/full", meta_path(&path)).unwrap();

        let reg = QRegressor::new(small_config()).unwrap();
        assert!(reg.save(&path).is_err());
    }

    #[test]
    fn load_without_metadata_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(QRegressor::load(&dir.path().join("missing.safetensors"), small_config()).is_err());
    }
}
