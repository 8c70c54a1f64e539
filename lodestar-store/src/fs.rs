//! Filesystem backend: one directory per provider, YAML records.

use lodestar_core::{Author, Catalog, Error, Model, Provider, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level index file listing provider ids.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProvidersIndex {
    providers: Vec<String>,
}

/// Model ids may contain `/` (e.g. `org/model`); flatten for file names.
fn model_file_name(model_id: &str) -> String {
    format!("{}.yaml", model_id.replace('/', "--"))
}

fn parse_err(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Parse {
        format: "yaml".to_string(),
        file: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Write `content` to `path` atomically: temp file in the same directory,
/// then rename over the destination.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, content).map_err(|e| Error::io("write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io("rename", path, e))
}

fn to_yaml<T: Serialize>(value: &T, path: &Path) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| parse_err(path, e))
}

/// Persist a catalog under `root`, creating directories as needed.
///
/// Providers no longer present in the catalog keep their directories; save
/// never deletes. Callers wanting a pristine tree remove `root` first.
pub fn save_dir(catalog: &Catalog, root: &Path) -> Result<()> {
    let providers = catalog.providers()?;
    let providers_dir = root.join("providers");
    fs::create_dir_all(&providers_dir).map_err(|e| Error::io("create dir", &providers_dir, e))?;

    let index = ProvidersIndex {
        providers: providers.iter().map(|p| p.id.clone()).collect(),
    };
    let index_path = root.join("providers.yaml");
    write_atomic(&index_path, &to_yaml(&index, &index_path)?)?;

    let authors = catalog.authors()?;
    let authors_path = root.join("authors.yaml");
    write_atomic(&authors_path, &to_yaml(&authors, &authors_path)?)?;

    for provider in &providers {
        let dir = providers_dir.join(&provider.id);
        let models_dir = dir.join("models");
        fs::create_dir_all(&models_dir).map_err(|e| Error::io("create dir", &models_dir, e))?;

        let provider_path = dir.join("provider.yaml");
        write_atomic(&provider_path, &to_yaml(&provider.config_only(), &provider_path)?)?;

        for model in provider.models.values() {
            let model_path = models_dir.join(model_file_name(&model.id));
            write_atomic(&model_path, &to_yaml(model, &model_path)?)?;
        }
    }
    Ok(())
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io("read", path, e))
}

/// Load a catalog from the directory layout written by [`save_dir`].
///
/// Referential soundness is checked after load; dangling author references
/// are tolerated but logged.
pub fn load_dir(root: &Path) -> Result<Catalog> {
    let catalog = Catalog::new();

    let authors_path = root.join("authors.yaml");
    if authors_path.exists() {
        let authors: Vec<Author> =
            serde_yaml::from_str(&read_to_string(&authors_path)?).map_err(|e| parse_err(&authors_path, e))?;
        for author in authors {
            catalog.set_author(author)?;
        }
    }

    let providers_dir = root.join("providers");
    if providers_dir.is_dir() {
        let entries =
            fs::read_dir(&providers_dir).map_err(|e| Error::io("read dir", &providers_dir, e))?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        for dir in dirs {
            let provider = load_provider_dir(&dir)?;
            catalog.set_provider(provider)?;
        }
    }

    let dangling = catalog.dangling_author_refs()?;
    if !dangling.is_empty() {
        tracing::warn!(
            path = %root.display(),
            authors = ?dangling,
            "loaded catalog references unknown authors"
        );
    }
    Ok(catalog)
}

fn load_provider_dir(dir: &Path) -> Result<Provider> {
    let provider_path = dir.join("provider.yaml");
    let mut provider: Provider =
        serde_yaml::from_str(&read_to_string(&provider_path)?).map_err(|e| parse_err(&provider_path, e))?;

    let models_dir = dir.join("models");
    if models_dir.is_dir() {
        let entries = fs::read_dir(&models_dir).map_err(|e| Error::io("read dir", &models_dir, e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        files.sort();
        for file in files {
            let model: Model =
                serde_yaml::from_str(&read_to_string(&file)?).map_err(|e| parse_err(&file, e))?;
            provider.models.insert(model.id.clone(), model);
        }
    }
    Ok(provider)
}
