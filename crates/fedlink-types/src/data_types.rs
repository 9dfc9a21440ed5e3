use crate::DataType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A set of [`DataType`]s packed into a single byte.
///
/// Serialises as a JSON array of labels in canonical order, e.g.
/// `["cot","chat"]`. The packed form lets the link layer swap a peer's
/// routing filter atomically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataTypeSet(u8);

impl DataTypeSet {
    /// The empty set.
    pub const EMPTY: DataTypeSet = DataTypeSet(0);

    /// Builds a set from any iterator of data types.
    pub fn from_types<I: IntoIterator<Item = DataType>>(types: I) -> Self {
        let mut set = Self::EMPTY;
        for t in types {
            set.insert(t);
        }
        set
    }

    /// Adds a data type to the set.
    pub fn insert(&mut self, data_type: DataType) {
        self.0 |= data_type.bit();
    }

    /// Returns `true` if the set contains the given data type.
    pub fn contains(self, data_type: DataType) -> bool {
        self.0 & data_type.bit() != 0
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of data types in the set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates the members in canonical order.
    pub fn iter(self) -> impl Iterator<Item = DataType> {
        DataType::ALL.into_iter().filter(move |t| self.contains(*t))
    }

    /// Raw bit representation.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Rebuilds a set from [`DataTypeSet::bits`], discarding unknown bits.
    pub fn from_bits(bits: u8) -> Self {
        Self::from_types(DataType::ALL.into_iter().filter(|t| bits & t.bit() != 0))
    }

    /// Canonical labels, in order.
    pub fn labels(self) -> Vec<&'static str> {
        self.iter().map(DataType::as_str).collect()
    }
}

impl FromIterator<DataType> for DataTypeSet {
    fn from_iter<I: IntoIterator<Item = DataType>>(iter: I) -> Self {
        Self::from_types(iter)
    }
}

impl fmt::Debug for DataTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for DataTypeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for DataTypeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let types = Vec::<DataType>::deserialize(deserializer)?;
        Ok(Self::from_types(types))
    }
}
