use crate::{GenomeInfo, ModelSource, OverlayInfo, OwnerKey, ProxyInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Owner entry in the JSON model description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerOverlays {
    pub owner: OwnerKey,
    #[serde(default)]
    pub overlays: Vec<OverlayInfo>,
}

/// Plain in-memory `ModelSource`, loadable from JSON.
///
/// Used by the command line front end and by tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ModelDescription", into = "ModelDescription")]
pub struct InMemoryModelSource {
    genomes: HashMap<String, GenomeInfo>,
    proxies: HashMap<String, ProxyInfo>,
    overlays: HashMap<OwnerKey, Vec<OverlayInfo>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModelDescription {
    #[serde(default)]
    genomes: Vec<GenomeInfo>,
    #[serde(default)]
    proxies: Vec<ProxyInfo>,
    #[serde(default)]
    owners: Vec<OwnerOverlays>,
}

impl From<ModelDescription> for InMemoryModelSource {
    fn from(desc: ModelDescription) -> Self {
        let mut source = InMemoryModelSource::new();
        for genome in desc.genomes {
            source.add_genome(genome);
        }
        for proxy in desc.proxies {
            source.add_proxy(proxy);
        }
        for entry in desc.owners {
            for overlay in entry.overlays {
                source.add_overlay(entry.owner.clone(), overlay);
            }
        }
        source
    }
}

impl From<InMemoryModelSource> for ModelDescription {
    fn from(source: InMemoryModelSource) -> Self {
        let mut genomes: Vec<GenomeInfo> = source.genomes.into_values().collect();
        genomes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut proxies: Vec<ProxyInfo> = source.proxies.into_values().collect();
        proxies.sort_by(|a, b| a.id.cmp(&b.id));
        let mut owners: Vec<OwnerOverlays> = source
            .overlays
            .into_iter()
            .map(|(owner, overlays)| OwnerOverlays { owner, overlays })
            .collect();
        owners.sort_by(|a, b| a.owner.cmp(&b.owner));
        Self {
            genomes,
            proxies,
            owners,
        }
    }
}

impl InMemoryModelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_genome(&mut self, genome: GenomeInfo) {
        self.genomes.insert(genome.id.clone(), genome);
    }

    pub fn add_proxy(&mut self, proxy: ProxyInfo) {
        self.proxies.insert(proxy.id.clone(), proxy);
    }

    pub fn add_overlay(&mut self, owner: OwnerKey, overlay: OverlayInfo) {
        let list = self.overlays.entry(owner).or_default();
        list.retain(|o| o.key != overlay.key);
        list.push(overlay);
    }

    pub fn remove_overlay(&mut self, owner: &OwnerKey, overlay_key: &str) {
        if let Some(list) = self.overlays.get_mut(owner) {
            list.retain(|o| o.key != overlay_key);
        }
    }

    pub fn remove_module(&mut self, owner: &OwnerKey, overlay_key: &str, module_key: &str) {
        if let Some(list) = self.overlays.get_mut(owner) {
            for overlay in list.iter_mut().filter(|o| o.key == overlay_key) {
                overlay.modules.retain(|m| m.key != module_key);
            }
        }
    }

    pub fn remove_genome(&mut self, model_id: &str) {
        self.genomes.remove(model_id);
        self.overlays.remove(&OwnerKey::Genome(model_id.to_string()));
    }
}

impl ModelSource for InMemoryModelSource {
    fn genome(&self, model_id: &str) -> Option<GenomeInfo> {
        self.genomes.get(model_id).cloned()
    }

    fn dynamic_proxy(&self, proxy_id: &str) -> Option<ProxyInfo> {
        self.proxies.get(proxy_id).cloned()
    }

    fn overlays(&self, owner: &OwnerKey) -> Vec<OverlayInfo> {
        self.overlays.get(owner).cloned().unwrap_or_default()
    }
}
