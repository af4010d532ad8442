//! Constant pool for payloads too wide to inline in an `InstructionData`
//! (vector splats, large blobs used by `iconst`-adjacent intrinsics).
//!
//! Named in spec §3 ("Function owns: … constant pool"); modeled as a
//! `PrimaryMap`-backed, hash-consing pool so two instructions embedding
//! identical bytes share one [`Constant`] handle, the way Cranelift's own
//! `ConstantPool` does.

use std::collections::HashMap;

use cranelift_entity::PrimaryMap;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use super::entities::Constant;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct ConstantData(Vec<u8>);

impl ConstantData {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ConstantData {
    fn from(bytes: Vec<u8>) -> Self {
        ConstantData(bytes)
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct ConstantPool {
    handles: PrimaryMap<Constant, ConstantData>,
    #[cfg_attr(feature = "enable-serde", serde(skip))]
    interned: HashMap<ConstantData, Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `data`, reusing an existing handle if identical bytes were
    /// already interned.
    pub fn insert(&mut self, data: ConstantData) -> Constant {
        if let Some(&handle) = self.interned.get(&data) {
            return handle;
        }
        let handle = self.handles.push(data.clone());
        self.interned.insert(data, handle);
        handle
    }

    pub fn get(&self, handle: Constant) -> &ConstantData {
        &self.handles[handle]
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
