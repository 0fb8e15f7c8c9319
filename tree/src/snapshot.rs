use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use models::Node;
use utilities::filesystem::temp_sibling;
use utilities::FileSystem;

use crate::ShadowTree;

impl ShadowTree {
    /// Stream the tree to disk as NDJSON, one node per line, through a
    /// temp file renamed over the canonical location.
    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            let _ = fs.create_dir_all(dir);
        }
        let tmp = temp_sibling(path);
        let nodes = self.export_nodes();

        let mut w = fs
            .open_write(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        for node in &nodes {
            let line = serde_json::to_vec(node)?;
            w.write_all(&line)?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
        drop(w);

        fs.rename(&tmp, path)
            .with_context(|| format!("failed to commit {}", path.display()))?;
        Ok(())
    }

    /// Load the snapshot, trying NDJSON first and falling back to the
    /// legacy single-object format. A successful legacy load is re-saved
    /// in the new format immediately.
    pub fn load(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        match self.load_streaming(fs, path) {
            Ok(count) => {
                tracing::info!("loaded {count} nodes from cache stream");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("streaming load failed ({e:#}), trying legacy format");
            }
        }

        let count = self.load_legacy(fs, path)?;
        tracing::info!("loaded {count} nodes from legacy cache, migrating to new format");
        if let Err(e) = self.save(fs, path) {
            tracing::error!("failed to migrate cache: {e:#}");
        }
        Ok(())
    }

    fn load_streaming(&self, fs: &dyn FileSystem, path: &Path) -> Result<usize> {
        let reader = fs
            .open_read(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        let reader = BufReader::new(reader);

        let mut nodes: HashMap<String, Node> = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // Any corrupt line invalidates the stream; the caller falls
            // back to the legacy format.
            let node: Node = serde_json::from_str(&line)?;
            nodes.insert(node.id.clone(), node);
        }

        if nodes.is_empty() {
            bail!("cache stream is empty");
        }

        let count = nodes.len();
        self.install(nodes);
        Ok(count)
    }

    fn load_legacy(&self, fs: &dyn FileSystem, path: &Path) -> Result<usize> {
        let data = fs.read(path)?;
        let map: HashMap<String, Node> = serde_json::from_slice(&data)?;
        if map.is_empty() {
            bail!("legacy cache is empty");
        }
        let count = map.len();
        self.install(map);
        Ok(count)
    }
}
