//! Entity trait: identity + the collection it is persisted in.

/// Entity marker + minimal interface.
///
/// Every entity lives in exactly one document collection and is addressed by
/// a string key within it.
pub trait Entity {
    /// Document collection holding entities of this type.
    const COLLECTION: &'static str;

    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + AsRef<str>;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
