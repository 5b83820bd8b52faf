//! The public file handle.
//!
//! [`Mdf`] owns the file bytes and the walked directory. Decoding is pull
//! based: nothing beyond the block directory is touched until a decode
//! operation asks for a group, and each group's layout plan is compiled once
//! and cached behind a mutex.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::blocks::Dialect;
use crate::error::{Error, Result};
use crate::parsing::directory::{DEFAULT_HOP_LIMIT, Directory};
use crate::parsing::layout::RecordLayoutPlan;
use crate::parsing::records::{DecodedChannels, decode_records};
use crate::types::{
    CancelToken, ChannelArray, ChannelDescriptor, ChannelGroupDescriptor, DecodedGroup, Value,
    Warning,
};

/// Tuning knobs for opening a file.
#[derive(Debug, Clone)]
pub struct MdfOptions {
    /// Hop budget for one link graph traversal. Files whose graphs need more
    /// hops than this are treated as corrupt.
    pub traversal_hop_limit: usize,
}

impl Default for MdfOptions {
    fn default() -> Self {
        Self {
            traversal_hop_limit: DEFAULT_HOP_LIMIT,
        }
    }
}

/// An opened measurement file.
pub struct Mdf {
    data: Vec<u8>,
    directory: Directory,
    hop_limit: usize,
    /// Layout plans, compiled lazily per group index.
    plans: Mutex<BTreeMap<usize, Arc<RecordLayoutPlan>>>,
}

impl std::fmt::Debug for Mdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mdf")
            .field("version", &self.directory.version_number)
            .field("groups", &self.directory.group_count())
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Mdf {
    /// Open a file from disk with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, MdfOptions::default())
    }

    /// Open a file from disk.
    pub fn open_with<P: AsRef<Path>>(path: P, options: MdfOptions) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes_with(data, options)
    }

    /// Open a file already loaded into memory, with default options.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, MdfOptions::default())
    }

    /// Open a file already loaded into memory.
    pub fn from_bytes_with(data: Vec<u8>, options: MdfOptions) -> Result<Self> {
        let directory = Directory::parse_with(&data, options.traversal_hop_limit)?;
        debug!(
            "opened version {} file with {} channel groups",
            directory.version_number,
            directory.group_count()
        );
        Ok(Self {
            data,
            directory,
            hop_limit: options.traversal_hop_limit,
            plans: Mutex::new(BTreeMap::new()),
        })
    }

    /// Numeric format version, e.g. 330 or 410.
    pub fn version(&self) -> u16 {
        self.directory.version_number
    }

    /// The block-layout dialect the file uses.
    pub fn dialect(&self) -> Dialect {
        self.directory.dialect
    }

    /// File-level degradations noticed at open time.
    pub fn warnings(&self) -> &[Warning] {
        &self.directory.warnings
    }

    /// Number of decodable channel groups.
    pub fn group_count(&self) -> usize {
        self.directory.group_count()
    }

    /// Describe every decodable channel group and its channels.
    pub fn channel_groups(&self) -> Vec<ChannelGroupDescriptor> {
        let mut descriptors = Vec::with_capacity(self.directory.group_count());
        for (dg_index, dg) in self.directory.data_groups.iter().enumerate() {
            for cg in &dg.channel_groups {
                let channels = cg
                    .channels
                    .iter()
                    .map(|ch| ChannelDescriptor {
                        name: ch.name.clone(),
                        unit: ch.unit.clone(),
                        bit_count: ch.bit_count,
                        is_master: ch.is_master,
                        array_dims: ch.array_dims.clone(),
                    })
                    .collect();
                descriptors.push(ChannelGroupDescriptor {
                    index: cg.index,
                    name: cg.name.clone(),
                    data_group: dg_index,
                    record_count: cg.record_count,
                    record_len: cg.record_len,
                    channels,
                });
            }
        }
        descriptors
    }

    /// Decode a single channel by name, master axis included.
    pub fn decode_channel(&self, group: usize, name: &str) -> Result<ChannelArray> {
        let plan = self.plan(group)?;
        if !plan.recipes.iter().any(|r| r.name == name) {
            return Err(Error::ChannelNotFound {
                group,
                name: name.to_string(),
            });
        }

        // Decode only the requested channel plus the master, not the whole
        // group.
        let reduced = RecordLayoutPlan {
            group_index: plan.group_index,
            record_len: plan.record_len,
            invalidation_bytes: plan.invalidation_bytes,
            recipes: plan
                .recipes
                .iter()
                .filter(|r| r.is_master || r.name == name)
                .cloned()
                .collect(),
        };

        let mut assembled = self.assemble(group, &reduced, None)?;
        if let Some(channel) = assembled.channels.remove(name) {
            return Ok(channel);
        }
        // The requested channel is the master itself.
        Ok(ChannelArray {
            master: None,
            ..(*assembled.master).clone()
        })
    }

    /// Decode every channel of one group.
    pub fn decode_group(&self, group: usize) -> Result<DecodedGroup> {
        let plan = self.plan(group)?;
        self.assemble(group, &plan, None)
    }

    /// Decode every channel of one group, checking a cancellation token
    /// between records.
    pub fn decode_group_with(&self, group: usize, cancel: &CancelToken) -> Result<DecodedGroup> {
        let plan = self.plan(group)?;
        self.assemble(group, &plan, Some(cancel))
    }

    /// Decode just the master axis of one group.
    ///
    /// For a group without a master channel this synthesizes the 0..n record
    /// index, like the full group decode does.
    pub fn master_channel(&self, group: usize) -> Result<Arc<ChannelArray>> {
        let plan = self.plan(group)?;
        let reduced = RecordLayoutPlan {
            group_index: plan.group_index,
            record_len: plan.record_len,
            invalidation_bytes: plan.invalidation_bytes,
            recipes: plan
                .recipes
                .iter()
                .filter(|r| r.is_master)
                .cloned()
                .collect(),
        };
        // Without a master recipe, record iteration still has to run so the
        // synthesized index has the right length.
        let reduced = if reduced.recipes.is_empty() {
            (*plan).clone()
        } else {
            reduced
        };
        Ok(self.assemble(group, &reduced, None)?.master)
    }

    /// Fetch or build the layout plan for one group.
    fn plan(&self, group: usize) -> Result<Arc<RecordLayoutPlan>> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(plan) = plans.get(&group) {
            return Ok(Arc::clone(plan));
        }

        let (_, cg) = self
            .directory
            .group(group)
            .ok_or_else(|| Error::GroupOutOfRange {
                index: group,
                group_count: self.directory.group_count(),
            })?;
        let plan = Arc::new(RecordLayoutPlan::build(cg)?);
        plans.insert(group, Arc::clone(&plan));
        Ok(plan)
    }

    /// Run the record decoder and assemble the public result shape.
    fn assemble(
        &self,
        group: usize,
        plan: &RecordLayoutPlan,
        cancel: Option<&CancelToken>,
    ) -> Result<DecodedGroup> {
        let (dg, cg) = self
            .directory
            .group(group)
            .ok_or_else(|| Error::GroupOutOfRange {
                index: group,
                group_count: self.directory.group_count(),
            })?;

        let DecodedChannels {
            mut samples,
            warnings: decode_warnings,
        } = decode_records(
            &self.data,
            &self.directory,
            dg,
            cg,
            plan,
            self.hop_limit,
            cancel,
        )?;

        let mut warnings = cg.warnings.clone();
        warnings.extend(decode_warnings);

        let record_count = samples.first().map_or(0, Vec::len);
        let master_index = plan.recipes.iter().position(|r| r.is_master);

        let master = match master_index {
            Some(i) => {
                let recipe = &plan.recipes[i];
                ChannelArray {
                    name: recipe.name.clone(),
                    unit: recipe.unit.clone(),
                    samples: std::mem::take(&mut samples[i]),
                    master: None,
                    warnings: recipe.warnings.clone(),
                }
            }
            None => {
                warn!("group {group}: no master channel, synthesizing sample index");
                warnings.push(Warning::MissingMaster { group });
                ChannelArray {
                    name: "index".to_string(),
                    unit: None,
                    samples: (0..record_count as u64)
                        .map(|i| Some(Value::UnsignedInteger(i)))
                        .collect(),
                    master: None,
                    warnings: vec![Warning::MissingMaster { group }],
                }
            }
        };
        let master = Arc::new(master);

        let mut channels = BTreeMap::new();
        for (i, recipe) in plan.recipes.iter().enumerate() {
            if Some(i) == master_index {
                continue;
            }
            channels.insert(
                recipe.name.clone(),
                ChannelArray {
                    name: recipe.name.clone(),
                    unit: recipe.unit.clone(),
                    samples: std::mem::take(&mut samples[i]),
                    master: Some(Arc::clone(&master)),
                    warnings: recipe.warnings.clone(),
                },
            );
        }

        Ok(DecodedGroup {
            master,
            channels,
            warnings,
        })
    }
}
