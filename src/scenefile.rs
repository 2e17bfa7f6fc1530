//! Binary scene persistence.
//!
//! The file holds the configuration block first, then the ordered building,
//! transmitter and point-receiver lists. Only persistent scene entities are
//! written; run-scoped state (walls, corners, path contributions) never
//! reaches the file. Serializing a just-deserialized scene reproduces the
//! input byte for byte.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::emitter::Emitter;
use crate::receiver::{Receiver, ReceiverSpec};
use crate::scene::{Building, Scene};
use crate::settings::Settings;


/// The on-disk form of a scene. Field order is the file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    pub settings: Settings,
    pub buildings: Vec<Building>,
    pub emitters: Vec<Emitter>,
    pub receivers: Vec<ReceiverSpec>,
}

impl SceneDocument {
    pub fn from_scene(settings: &Settings, scene: &Scene) -> Self {
        Self {
            settings: settings.clone(),
            buildings: scene.buildings.clone(),
            emitters: scene.emitters.iter().map(|e| (**e).clone()).collect(),
            receivers: scene.receivers.iter().map(|r| ReceiverSpec::from(r.as_ref())).collect(),
        }
    }

    pub fn to_scene(&self) -> Scene {
        Scene {
            buildings: self.buildings.clone(),
            emitters: self.emitters.iter().map(|e| Arc::new(e.clone())).collect(),
            receivers: self
                .receivers
                .iter()
                .map(|spec| Arc::new(Receiver::from(spec)))
                .collect(),
        }
    }
}

pub fn to_bytes(document: &SceneDocument) -> anyhow::Result<Vec<u8>> {
    Ok(bincode::serialize(document)?)
}

pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<SceneDocument> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn save(document: &SceneDocument, path: &Path) -> anyhow::Result<()> {
    fs::write(path, to_bytes(document)?)?;
    Ok(())
}

pub fn load(path: &Path) -> anyhow::Result<SceneDocument> {
    from_bytes(&fs::read(path)?)
}
