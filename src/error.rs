//! Error types for setup, I/O and GPU operations.
//!
//! Nothing in a simulation step returns an error: points outside the volume,
//! non-leaf traversal results and degenerate trees are handled as data by
//! the update stage. These types cover loading the spatial index, building
//! the pool, reading configuration and talking to the GPU.

use thiserror::Error;

/// Errors raised while loading or validating a spatial index.
#[derive(Debug, Error)]
pub enum SdfError {
    /// Byte buffer is not a whole number of nodes.
    #[error("SDF buffer length {len} is not a multiple of the node size {stride}")]
    ByteLength { len: usize, stride: usize },
    /// A child slot points past the end of the node array.
    #[error("node {node} slot {slot} references missing child {child}")]
    ChildOutOfRange { node: usize, slot: usize, child: i32 },
    /// Slot 0 marks the node as a leaf, yet a later slot holds a child.
    #[error("leaf node {node} has a child in slot {slot}")]
    ChildOfLeaf { node: usize, slot: usize },
    /// A child box pokes out of its parent box.
    #[error("node {child} is not contained in its parent {node}")]
    ChildNotContained { node: usize, child: usize },
    /// `min` exceeds `max` on some axis.
    #[error("node {node} has min > max")]
    InvertedBounds { node: usize },
    /// A node is reachable through more than one parent.
    #[error("node {node} is reachable more than once; the index is not a tree")]
    NotATree { node: usize },
    /// Failed to read the index from disk.
    #[error("failed to read SDF file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the particle pool and its index collections.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A pool needs at least one slot.
    #[error("particle pool capacity must be at least 1")]
    ZeroCapacity,
    /// Pushing into a full collection; means an index was duplicated.
    #[error("index collection is full, cannot push particle {index}")]
    Overflow { index: u32 },
    /// Slot state disagrees with free-collection membership.
    #[error("lifecycle invariant violated at slot {index}: {reason}")]
    Invariant { index: u32, reason: &'static str },
}

/// Errors raised while reading or checking configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A parameter is outside its accepted range.
    #[error("invalid parameter `{name}`: {reason}")]
    Invalid { name: &'static str, reason: &'static str },
}

/// Errors that can occur during GPU initialization or readback.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    #[error("No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support.")]
    NoAdapter,
    /// Failed to create GPU device.
    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
    /// The pool does not fit in one dispatch or one storage binding.
    #[error("capacity {capacity} exceeds the device limit of {max} particles")]
    CapacityTooLarge { capacity: u32, max: u32 },
    /// Failed to map buffer for reading.
    #[error("Failed to map GPU buffer: {0}")]
    BufferMapping(String),
}

/// Errors that can occur when running a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("spatial index error: {0}")]
    Sdf(#[from] SdfError),
    #[error("particle pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Crate-wide result alias.
pub type Result<T, E = SimulationError> = std::result::Result<T, E>;
