//! Named blobs of encrypted vectors
//!
//! Slot names never go on the wire. The reader rebuilds them from the
//! [`BlobSchema`] of the stage it is consuming.

use crate::layout::{frame_slots, split_slots, Layout};
use schemes::EncryptedVector;
use shared::{HeStatsError, HeStatsResult, SchemeTag};
use tracing::debug;

/// Expected slot of a stage: its name and scheme variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: String,
    pub tag: SchemeTag,
}

/// Ordered slots a stage reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobSchema {
    slots: Vec<SlotSpec>,
}

impl BlobSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema with every slot under the same scheme variant
    pub fn uniform<I, S>(names: I, tag: SchemeTag) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(Self::new(), |schema, name| schema.slot(name, tag))
    }

    pub fn slot(mut self, name: impl Into<String>, tag: SchemeTag) -> Self {
        self.slots.push(SlotSpec {
            name: name.into(),
            tag,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[SlotSpec] {
        &self.slots
    }
}

/// Ordered named encrypted vectors crossing the holder/analyzer boundary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    slots: Vec<(String, EncryptedVector)>,
}

impl Blob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, vector: EncryptedVector) -> Self {
        self.push(name, vector);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, vector: EncryptedVector) {
        self.slots.push((name.into(), vector));
    }

    pub fn get(&self, name: &str) -> Option<&EncryptedVector> {
        self.slots.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Slot `name`, or a protocol error naming the missing slot
    pub fn require(&self, name: &str) -> HeStatsResult<&EncryptedVector> {
        self.get(name)
            .ok_or_else(|| HeStatsError::protocol(format!("blob has no slot named {name}")))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(n, _)| n.as_str())
    }

    pub fn vectors(&self) -> impl Iterator<Item = &EncryptedVector> {
        self.slots.iter().map(|(_, v)| v)
    }

    /// Schema a reader needs to parse this blob back
    pub fn schema(&self) -> BlobSchema {
        self.slots
            .iter()
            .fold(BlobSchema::new(), |schema, (name, v)| schema.slot(name.clone(), v.tag))
    }
}

/// Serialize vectors in order, one slot each
pub fn serialize_vectors(vectors: &[EncryptedVector], layout: Layout) -> HeStatsResult<Vec<u8>> {
    let slots: Vec<Vec<u8>> = vectors.iter().map(EncryptedVector::to_bytes).collect();
    frame_slots(&slots, layout)
}

/// Parse exactly `count` vectors
pub fn deserialize_vectors(
    bytes: &[u8],
    count: usize,
    layout: Layout,
) -> HeStatsResult<Vec<EncryptedVector>> {
    split_slots(bytes, count, layout)?
        .into_iter()
        .map(EncryptedVector::from_bytes)
        .collect()
}

pub fn serialize_blob(blob: &Blob, layout: Layout) -> HeStatsResult<Vec<u8>> {
    let slots: Vec<Vec<u8>> = blob.vectors().map(EncryptedVector::to_bytes).collect();
    let bytes = frame_slots(&slots, layout)?;
    debug!(slots = blob.len(), bytes = bytes.len(), %layout, "blob serialized");
    Ok(bytes)
}

/// Parse a blob against the schema of the consuming stage
pub fn deserialize_blob(bytes: &[u8], schema: &BlobSchema, layout: Layout) -> HeStatsResult<Blob> {
    let vectors = deserialize_vectors(bytes, schema.len(), layout)?;
    let mut blob = Blob::new();
    for (spec, vector) in schema.slots().iter().zip(vectors) {
        if vector.tag != spec.tag {
            return Err(HeStatsError::mismatch(format!(
                "slot {} holds a {} vector, expected {}",
                spec.name, vector.tag, spec.tag
            )));
        }
        blob.push(spec.name.clone(), vector);
    }
    debug!(slots = blob.len(), bytes = bytes.len(), %layout, "blob deserialized");
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::FramingError;

    fn vector(tag: SchemeTag, length: usize, fill: u8) -> EncryptedVector {
        EncryptedVector::new(tag, length, 0, vec![fill; 3 + length])
    }

    #[test]
    fn test_vectors_round_trip_every_layout() {
        let vectors = vec![
            vector(SchemeTag::Exact, 5, 1),
            vector(SchemeTag::Approx, 1, 2),
            vector(SchemeTag::Additive, 3, 3),
        ];
        for layout in Layout::ALL {
            for n in 1..=vectors.len() {
                let bytes = serialize_vectors(&vectors[..n], layout).unwrap();
                assert_eq!(deserialize_vectors(&bytes, n, layout).unwrap(), vectors[..n]);
            }
        }
    }

    #[test]
    fn test_named_blob_round_trip() {
        let blob = Blob::new()
            .with("salary", vector(SchemeTag::Exact, 5, 7))
            .with("bonus", vector(SchemeTag::Exact, 5, 8));
        let bytes = serialize_blob(&blob, Layout::OpenTail).unwrap();
        let schema = BlobSchema::uniform(["salary", "bonus"], SchemeTag::Exact);
        assert_eq!(blob.schema(), schema);

        let restored = deserialize_blob(&bytes, &schema, Layout::OpenTail).unwrap();
        assert_eq!(restored, blob);
        assert_eq!(restored.names().collect::<Vec<_>>(), vec!["salary", "bonus"]);
        assert!(restored.require("bonus").is_ok());
        assert!(matches!(
            restored.require("hours"),
            Err(HeStatsError::Protocol { .. })
        ));
    }

    #[test]
    fn test_schema_tag_mismatch() {
        let blob = Blob::new().with("salary", vector(SchemeTag::Approx, 2, 1));
        let bytes = serialize_blob(&blob, Layout::Prefixed).unwrap();
        let schema = BlobSchema::new().slot("salary", SchemeTag::Exact);
        assert!(matches!(
            deserialize_blob(&bytes, &schema, Layout::Prefixed),
            Err(HeStatsError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_schema_longer_than_blob() {
        let blob = Blob::new().with("salary", vector(SchemeTag::Exact, 2, 1));
        let bytes = serialize_blob(&blob, Layout::Prefixed).unwrap();
        let schema = BlobSchema::uniform(["salary", "bonus"], SchemeTag::Exact);
        assert!(matches!(
            deserialize_blob(&bytes, &schema, Layout::Prefixed),
            Err(HeStatsError::Framing(FramingError::MissingSlots {
                expected: 2,
                found: 1
            }))
        ));
    }
}
