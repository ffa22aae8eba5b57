use crate::error::{PackError, Result};
use crate::pack::format::{FileNode, UseFlag};
use std::collections::HashMap;

/// Outcome of searching for a free table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLookup {
    /// Index of the first `NotUsing` slot
    Found(usize),
    /// Every slot is taken; the pack must be rebuilt before adding
    Full,
    /// No pack is open
    NoTable,
}

/// Fixed-capacity file table plus the name index over its live nodes
///
/// The node vector is the source of truth; the map is rebuilt from it on open
/// and kept in step by [`mark_in_use`](Self::mark_in_use) and
/// [`mark_deleted`](Self::mark_deleted).
#[derive(Debug, Default)]
pub struct FileNodeTable {
    nodes: Vec<FileNode>,
    index: HashMap<String, usize>,
}

impl FileNodeTable {
    /// A table of `count` empty slots
    pub fn with_capacity(count: usize) -> Self {
        Self {
            nodes: vec![FileNode::default(); count],
            index: HashMap::new(),
        }
    }

    /// Build the table from records read off disk
    pub fn from_nodes(nodes: Vec<FileNode>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if !node.is_live() {
                continue;
            }
            if index.insert(node.name.as_str().to_string(), i).is_some() {
                return Err(PackError::CorruptTable(format!(
                    "duplicate live name {}",
                    node.name
                )));
            }
        }
        Ok(Self { nodes, index })
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of live files
    pub fn live_count(&self) -> usize {
        self.index.len()
    }

    pub fn nodes(&self) -> &[FileNode] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&FileNode> {
        self.nodes.get(index)
    }

    /// Hashed lookup of a live file
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Linear lookup of a live file, independent of the hash index
    pub fn scan_by_name(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.is_live() && node.name.as_str() == name)
    }

    pub fn first_empty_slot(&self) -> SlotLookup {
        if self.nodes.is_empty() {
            return SlotLookup::NoTable;
        }
        match self
            .nodes
            .iter()
            .position(|node| node.use_flag == UseFlag::NotUsing)
        {
            Some(i) => SlotLookup::Found(i),
            None => SlotLookup::Full,
        }
    }

    /// Live nodes in slot order
    pub fn live_nodes(&self) -> impl Iterator<Item = (usize, &FileNode)> {
        self.nodes.iter().enumerate().filter(|(_, node)| node.is_live())
    }

    /// Store a live node in `slot`, which must be empty
    pub fn mark_in_use(&mut self, slot: usize, mut node: FileNode) -> Result<()> {
        let current = self.nodes.get(slot).ok_or_else(|| {
            PackError::CorruptTable(format!("slot {} out of range", slot))
        })?;
        if current.use_flag != UseFlag::NotUsing {
            return Err(PackError::CorruptTable(format!("slot {} is occupied", slot)));
        }
        if self.index.contains_key(node.name.as_str()) {
            return Err(PackError::Duplicate(node.name.to_string()));
        }

        node.use_flag = UseFlag::InUsing;
        self.index.insert(node.name.as_str().to_string(), slot);
        self.nodes[slot] = node;
        Ok(())
    }

    /// Soft-delete a live node; its slot and payload stay allocated
    pub fn mark_deleted(&mut self, name: &str) -> Result<usize> {
        let slot = self
            .index
            .remove(name)
            .ok_or_else(|| PackError::NotFound(name.to_string()))?;
        self.nodes[slot].use_flag = UseFlag::Deleted;
        Ok(slot)
    }

    /// Copy `source` into the front of this table, shifting every offset
    /// through `relocate`. Slots of every state are carried over.
    pub fn copy_from(&mut self, source: &[FileNode], relocate: impl Fn(u32) -> u32) -> Result<()> {
        if source.len() > self.nodes.len() {
            return Err(PackError::Rebuild(format!(
                "file list number is not enough: {} < {}",
                self.nodes.len(),
                source.len()
            )));
        }

        for (dst, src) in self.nodes.iter_mut().zip(source) {
            *dst = src.clone();
            if dst.use_flag != UseFlag::NotUsing {
                dst.offset = relocate(src.offset);
            }
        }

        self.index.clear();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_live() && self.index.insert(node.name.as_str().to_string(), i).is_some() {
                return Err(PackError::CorruptTable(format!(
                    "duplicate live name {}",
                    node.name
                )));
            }
        }
        for (name, &slot) in &self.index {
            debug_assert_eq!(
                self.scan_by_name(name),
                Some(slot),
                "index out of step for {}",
                name
            );
        }
        Ok(())
    }
}
