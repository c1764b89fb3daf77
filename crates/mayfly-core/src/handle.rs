//! Display handles — deterministic pseudonyms for otherwise anonymous parties.

use sha2::{Digest, Sha256};

use crate::types::ParticipantId;

// ── Word lists (curated) ──

pub const SHADES: &[&str] = &[
    "Umber",
    "Cobalt",
    "Saffron",
    "Viridian",
    "Ochre",
    "Indigo",
    "Slate",
    "Crimson",
    "Amber",
    "Teal",
    "Sable",
    "Ivory",
    "Russet",
    "Cerulean",
    "Mauve",
    "Jade",
    "Onyx",
    "Coral",
    "Fawn",
    "Pewter",
    "Sienna",
    "Lilac",
    "Bronze",
    "Moss",
];

pub const CREATURES: &[&str] = &[
    "Fox",
    "Heron",
    "Otter",
    "Lynx",
    "Wren",
    "Badger",
    "Ibis",
    "Marten",
    "Plover",
    "Stoat",
    "Kestrel",
    "Vole",
    "Cormorant",
    "Hare",
    "Shrike",
    "Newt",
    "Pike",
    "Swift",
    "Raven",
    "Tern",
    "Weasel",
    "Finch",
    "Grouse",
    "Osprey",
    "Curlew",
    "Dormouse",
    "Magpie",
    "Sandpiper",
];

/// Derive a stable "Umber Fox" style handle from a participant id.
/// Every client that sees the same id renders the same handle, with no
/// account or registry behind it.
pub fn derive_handle(id: &ParticipantId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_str().as_bytes());
    let h = hasher.finalize();

    fn pick<'a>(list: &'a [&str], h: &[u8], offset: usize) -> &'a str {
        let chunk = u32::from_be_bytes([h[offset], h[offset + 1], h[offset + 2], h[offset + 3]]);
        list[(chunk as usize) % list.len()]
    }

    format!("{} {}", pick(SHADES, &h, 0), pick(CREATURES, &h, 4))
}
