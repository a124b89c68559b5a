//! Error types for the game simulation.
//!
//! Entity-level failures never halt the simulation. Commands report a
//! [`CommandError`] to the caller (the UI or the AI) and leave the world
//! untouched; [`GameError`] covers everything outside a single command.

use thiserror::Error;

use crate::components::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Player id is not registered with the simulation.
    #[error("Unknown player: {0}")]
    UnknownPlayer(u8),

    /// No template exists for the requested race/kind pair.
    #[error("No template for {race} {kind}")]
    MissingTemplate {
        /// Race name.
        race: String,
        /// Unit or building kind name.
        kind: String,
    },

    /// Configuration or data file could not be parsed.
    #[error("Failed to parse data: {0}")]
    DataParseError(String),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// A snapshot could not be encoded or decoded.
    #[error("Snapshot encoding failed: {0}")]
    SnapshotEncoding(String),

    /// No snapshot stored under this name.
    #[error("No snapshot named {0:?}")]
    SnapshotNotFound(String),

    /// A rejected command surfaced through an API that returns [`GameError`].
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Why a command was rejected.
///
/// These never propagate beyond the command surface: the simulation logs
/// them and carries on. The UI decides what (if anything) to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Referenced unit/building no longer exists or is dead.
    #[error("Target {0} is not a valid target")]
    InvalidTarget(EntityId),

    /// The owning player cannot pay for the order. The ledger is unchanged.
    #[error("Insufficient resources")]
    InsufficientResources,

    /// The production queue is at capacity. Nothing was deducted.
    #[error("Production queue is full")]
    QueueFull,

    /// Placement search exhausted every candidate.
    #[error("No valid placement found")]
    NoValidPlacement,

    /// The command does not apply to the addressed entity.
    #[error("Unknown command for entity {0}")]
    UnknownCommand(EntityId),

    /// The addressed entity does not exist.
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    /// The unit lacks the capability the command needs (attack, gather, build).
    #[error("Entity {0} cannot perform this command")]
    MissingCapability(EntityId),

    /// The building is still under construction.
    #[error("Building {0} is not yet constructed")]
    NotConstructed(EntityId),

    /// The building's template does not list this unit kind.
    #[error("Building {0} cannot produce this unit")]
    CannotProduce(EntityId),

    /// No queue entry exists at the given index.
    #[error("No production entry at index {0}")]
    NoSuchEntry(usize),
}
