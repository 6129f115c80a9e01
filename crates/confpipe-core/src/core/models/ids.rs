use slotmap::new_key_type;

new_key_type! {
    /// Stable identifier for a conformer geometry stored in a graph's arena.
    pub struct ConformerId;
}
