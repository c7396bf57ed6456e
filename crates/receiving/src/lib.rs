//! Receiving domain module (intake containers, event-sourced).
//!
//! A container groups the parts expected in one delivery. Confirming it with
//! the arrival date increments stock once per line; everything before that is
//! freely editable and has no stock effect.

pub mod container;

pub use container::{
    AddPart, ChangeQuantity, ConfirmArrival, ContainerConfirmed, ContainerDeleted,
    ContainerRegistered, DeleteContainer, NewReceivingLine, PartAdded, PartRemoved,
    QuantityChanged, ReceivingCommand, ReceivingContainer, ReceivingEvent, ReceivingLine,
    ReceivingStatus, RegisterContainer, RemovePart,
};
