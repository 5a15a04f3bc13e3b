//! Class-folder datasets and a shuffling batch loader.
//!
//! Layout: one sub-directory per class under the split root, each holding
//! `*.csv` files with one comma-separated feature row per line. Classes are
//! indexed by sorted directory name.

use anyhow::{Context, bail};
use earlybird_core::{Batch, DataSource, TrainError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: Vec<f64>,
    pub label: u32,
}

#[derive(Debug, Clone)]
pub struct ClassFolderDataset {
    classes: Vec<String>,
    samples: Vec<Sample>,
    feature_dim: usize,
}

impl ClassFolderDataset {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        if !root.is_dir() {
            bail!("dataset directory {} does not exist", root.display());
        }

        let mut class_dirs = Vec::new();
        for entry in std::fs::read_dir(root).with_context(|| format!("reading {}", root.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                class_dirs.push(entry.path());
            }
        }
        class_dirs.sort();
        if class_dirs.is_empty() {
            bail!("no class directories under {}", root.display());
        }

        let mut classes = Vec::with_capacity(class_dirs.len());
        let mut samples = Vec::new();
        let mut feature_dim = None;

        for (label, dir) in class_dirs.iter().enumerate() {
            let class = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut files: Vec<_> = std::fs::read_dir(dir)?
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
                .collect();
            files.sort();

            for file in files {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                for (line_no, line) in content.lines().enumerate() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let features = parse_row(line).with_context(|| {
                        format!("{}:{}", file.display(), line_no + 1)
                    })?;
                    match feature_dim {
                        None => feature_dim = Some(features.len()),
                        Some(dim) if dim != features.len() => bail!(
                            "{}:{}: expected {dim} features, found {}",
                            file.display(),
                            line_no + 1,
                            features.len()
                        ),
                        Some(_) => {}
                    }
                    samples.push(Sample {
                        features,
                        label: label as u32,
                    });
                }
            }
            classes.push(class);
        }

        let Some(feature_dim) = feature_dim else {
            bail!("no samples found under {}", root.display());
        };
        tracing::debug!(
            root = %root.display(),
            classes = classes.len(),
            samples = samples.len(),
            feature_dim,
            "Loaded dataset"
        );
        Ok(Self {
            classes,
            samples,
            feature_dim,
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

fn parse_row(line: &str) -> anyhow::Result<Vec<f64>> {
    line.split(',')
        .map(|field| {
            let field = field.trim();
            field
                .parse::<f64>()
                .with_context(|| format!("invalid feature '{field}'"))
        })
        .collect()
}

/// Yields fixed-size batches, optionally reshuffled every pass.
pub struct BatchLoader {
    dataset: ClassFolderDataset,
    batch_size: usize,
    shuffle: bool,
    order: Vec<usize>,
    rng: StdRng,
}

impl BatchLoader {
    pub fn new(dataset: ClassFolderDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        let order = (0..dataset.len()).collect();
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            order,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }
}

impl DataSource for BatchLoader {
    type Input = Vec<Vec<f64>>;

    fn batches(&mut self) -> impl Iterator<Item = Result<Batch<Vec<Vec<f64>>>, TrainError>> + '_ {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        let samples = self.dataset.samples();
        self.order.chunks(self.batch_size).map(move |chunk| {
            Ok(Batch::new(
                chunk.iter().map(|&i| samples[i].features.clone()).collect(),
                chunk.iter().map(|&i| samples[i].label).collect(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_split(root: &Path, classes: &[(&str, &str)]) {
        for (class, rows) in classes {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("part-0.csv"), rows).unwrap();
        }
    }

    #[test]
    fn test_load_assigns_sorted_class_indices() {
        let dir = TempDir::new().unwrap();
        write_split(
            dir.path(),
            &[("dog", "1.0,2.0\n3.0,4.0\n"), ("cat", "# header\n0.5, 0.5\n")],
        );

        let ds = ClassFolderDataset::load(dir.path()).unwrap();
        assert_eq!(ds.classes(), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.feature_dim(), 2);
        assert_eq!(ds.samples()[0].label, 0);
        assert_eq!(ds.samples()[1].features, vec![1.0, 2.0]);
        assert_eq!(ds.samples()[1].label, 1);
    }

    #[test]
    fn test_load_rejects_ragged_rows() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), &[("a", "1,2\n1,2,3\n")]);
        let err = ClassFolderDataset::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("expected 2 features"));
    }

    #[test]
    fn test_load_rejects_bad_number() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), &[("a", "1,x\n")]);
        assert!(ClassFolderDataset::load(dir.path()).is_err());
    }

    #[test]
    fn test_load_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(ClassFolderDataset::load(&dir.path().join("train")).is_err());
    }

    #[test]
    fn test_loader_batches_cover_dataset() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), &[("a", "1\n2\n3\n"), ("b", "4\n5\n")]);
        let ds = ClassFolderDataset::load(dir.path()).unwrap();
        let mut loader = BatchLoader::new(ds, 2, true, 7);
        assert_eq!(loader.num_batches(), 3);

        for _ in 0..2 {
            let batches: Vec<_> = loader.batches().collect::<Result<_, _>>().unwrap();
            let sizes: Vec<_> = batches.iter().map(|b| b.targets.len()).collect();
            assert_eq!(sizes, vec![2, 2, 1]);

            let mut seen: Vec<f64> = batches
                .iter()
                .flat_map(|b| b.inputs.iter().map(|row| row[0]))
                .collect();
            seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        }
    }

    #[test]
    fn test_loader_without_shuffle_keeps_order() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), &[("a", "1\n2\n"), ("b", "3\n")]);
        let ds = ClassFolderDataset::load(dir.path()).unwrap();
        let mut loader = BatchLoader::new(ds, 8, false, 0);
        let batch = loader.batches().next().unwrap().unwrap();
        assert_eq!(batch.targets, vec![0, 0, 1]);
    }
}
