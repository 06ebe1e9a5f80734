//! Datatype kinds and typesets
//!
//! Every cell carries exactly one `Kind`. The enumeration is closed: adding a
//! kind means touching the molder, the comparator and the loader.
//!
//! `TypeSet` is a 64-bit mask over kinds. Keylists use it to restrict what a
//! variable or parameter may hold, and the binder uses it to select which
//! word kinds a pass touches.

use std::fmt;

/// Closed enumeration of runtime datatypes
///
/// The discriminant order is the cross-kind sort order used by `compare`,
/// so `End` sorts below every real kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    End = 0,
    Trash,
    Void,
    Blank,
    Bar,
    Logic,
    Integer,
    Decimal,
    Char,
    Pair,
    Tuple,
    Time,
    Date,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Refinement,
    Issue,
    Block,
    Group,
    Path,
    SetPath,
    GetPath,
    LitPath,
    String,
    File,
    Url,
    Tag,
    Binary,
    Bitset,
    Map,
    Object,
    Module,
    Port,
    Error,
    Frame,
    Function,
    Datatype,
    Typeset,
    Handle,
}

const ALL_KINDS: [Kind; 41] = [
    Kind::End,
    Kind::Trash,
    Kind::Void,
    Kind::Blank,
    Kind::Bar,
    Kind::Logic,
    Kind::Integer,
    Kind::Decimal,
    Kind::Char,
    Kind::Pair,
    Kind::Tuple,
    Kind::Time,
    Kind::Date,
    Kind::Word,
    Kind::SetWord,
    Kind::GetWord,
    Kind::LitWord,
    Kind::Refinement,
    Kind::Issue,
    Kind::Block,
    Kind::Group,
    Kind::Path,
    Kind::SetPath,
    Kind::GetPath,
    Kind::LitPath,
    Kind::String,
    Kind::File,
    Kind::Url,
    Kind::Tag,
    Kind::Binary,
    Kind::Bitset,
    Kind::Map,
    Kind::Object,
    Kind::Module,
    Kind::Port,
    Kind::Error,
    Kind::Frame,
    Kind::Function,
    Kind::Datatype,
    Kind::Typeset,
    Kind::Handle,
];

impl Kind {
    /// All kinds in discriminant order
    pub fn all() -> &'static [Kind] {
        &ALL_KINDS
    }

    /// Datatype name as seen by user code (e.g. `integer!`)
    pub fn name(self) -> &'static str {
        match self {
            Kind::End => "end!",
            Kind::Trash => "trash!",
            Kind::Void => "void!",
            Kind::Blank => "blank!",
            Kind::Bar => "bar!",
            Kind::Logic => "logic!",
            Kind::Integer => "integer!",
            Kind::Decimal => "decimal!",
            Kind::Char => "char!",
            Kind::Pair => "pair!",
            Kind::Tuple => "tuple!",
            Kind::Time => "time!",
            Kind::Date => "date!",
            Kind::Word => "word!",
            Kind::SetWord => "set-word!",
            Kind::GetWord => "get-word!",
            Kind::LitWord => "lit-word!",
            Kind::Refinement => "refinement!",
            Kind::Issue => "issue!",
            Kind::Block => "block!",
            Kind::Group => "group!",
            Kind::Path => "path!",
            Kind::SetPath => "set-path!",
            Kind::GetPath => "get-path!",
            Kind::LitPath => "lit-path!",
            Kind::String => "string!",
            Kind::File => "file!",
            Kind::Url => "url!",
            Kind::Tag => "tag!",
            Kind::Binary => "binary!",
            Kind::Bitset => "bitset!",
            Kind::Map => "map!",
            Kind::Object => "object!",
            Kind::Module => "module!",
            Kind::Port => "port!",
            Kind::Error => "error!",
            Kind::Frame => "frame!",
            Kind::Function => "function!",
            Kind::Datatype => "datatype!",
            Kind::Typeset => "typeset!",
            Kind::Handle => "handle!",
        }
    }

    /// Look a kind up by its datatype name
    ///
    /// Internal kinds (`end!`, `trash!`) are never returned.
    pub fn from_name(name: &str) -> Option<Kind> {
        ALL_KINDS
            .iter()
            .copied()
            .filter(|k| !matches!(k, Kind::End | Kind::Trash))
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    pub fn is_word(self) -> bool {
        matches!(
            self,
            Kind::Word
                | Kind::SetWord
                | Kind::GetWord
                | Kind::LitWord
                | Kind::Refinement
                | Kind::Issue
        )
    }

    /// Kinds whose payload is an array of cells
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Kind::Block
                | Kind::Group
                | Kind::Path
                | Kind::SetPath
                | Kind::GetPath
                | Kind::LitPath
        )
    }

    pub fn is_path(self) -> bool {
        matches!(
            self,
            Kind::Path | Kind::SetPath | Kind::GetPath | Kind::LitPath
        )
    }

    pub fn is_string(self) -> bool {
        matches!(self, Kind::String | Kind::File | Kind::Url | Kind::Tag)
    }

    /// Kinds whose payload is any series (arrays, strings, binaries, bitsets, maps)
    pub fn is_series(self) -> bool {
        self.is_array()
            || self.is_string()
            || matches!(self, Kind::Binary | Kind::Bitset | Kind::Map)
    }

    pub fn is_context(self) -> bool {
        matches!(
            self,
            Kind::Object | Kind::Module | Kind::Port | Kind::Error | Kind::Frame
        )
    }

    pub fn is_number(self) -> bool {
        matches!(self, Kind::Integer | Kind::Decimal)
    }

    /// Kinds that are never stored into user-visible slots
    pub fn is_internal(self) -> bool {
        matches!(self, Kind::End | Kind::Trash)
    }

    fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitset over `Kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeSet(u64);

impl TypeSet {
    pub const EMPTY: TypeSet = TypeSet(0);

    /// Every kind a user-visible variable can hold (void included)
    pub const ANY_VALUE: TypeSet = TypeSet(!((1u64 << Kind::End as u8) | (1u64 << Kind::Trash as u8)));

    /// Every word kind
    pub const ANY_WORD: TypeSet = TypeSet(
        (1u64 << Kind::Word as u8)
            | (1u64 << Kind::SetWord as u8)
            | (1u64 << Kind::GetWord as u8)
            | (1u64 << Kind::LitWord as u8)
            | (1u64 << Kind::Refinement as u8)
            | (1u64 << Kind::Issue as u8),
    );

    pub fn of(kind: Kind) -> Self {
        TypeSet(kind.bit())
    }

    pub fn from_kinds(kinds: &[Kind]) -> Self {
        kinds.iter().fold(TypeSet::EMPTY, |set, k| set.with(*k))
    }

    /// Everything a value may be except void
    pub fn any_value_except_void() -> Self {
        TypeSet::ANY_VALUE.without(Kind::Void)
    }

    pub fn with(self, kind: Kind) -> Self {
        TypeSet(self.0 | kind.bit())
    }

    pub fn without(self, kind: Kind) -> Self {
        TypeSet(self.0 & !kind.bit())
    }

    pub fn union(self, other: TypeSet) -> Self {
        TypeSet(self.0 | other.0)
    }

    pub fn contains(self, kind: Kind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Kinds in this set, in discriminant order
    pub fn kinds(self) -> impl Iterator<Item = Kind> {
        ALL_KINDS.iter().copied().filter(move |k| self.contains(*k))
    }

    /// Resolve a typeset name such as `any-word!` or `any-number!`
    pub fn from_name(name: &str) -> Option<TypeSet> {
        let lower = name.to_ascii_lowercase();
        let set = match lower.as_str() {
            "any-value!" => TypeSet::ANY_VALUE,
            "any-word!" => TypeSet::ANY_WORD,
            "any-number!" | "number!" => TypeSet::from_kinds(&[Kind::Integer, Kind::Decimal]),
            "any-block!" | "any-array!" => TypeSet::from_kinds(&[
                Kind::Block,
                Kind::Group,
                Kind::Path,
                Kind::SetPath,
                Kind::GetPath,
                Kind::LitPath,
            ]),
            "any-path!" => TypeSet::from_kinds(&[
                Kind::Path,
                Kind::SetPath,
                Kind::GetPath,
                Kind::LitPath,
            ]),
            "any-string!" => {
                TypeSet::from_kinds(&[Kind::String, Kind::File, Kind::Url, Kind::Tag])
            }
            "any-context!" | "any-object!" => TypeSet::from_kinds(&[
                Kind::Object,
                Kind::Module,
                Kind::Port,
                Kind::Error,
                Kind::Frame,
            ]),
            "any-series!" => TypeSet(
                ALL_KINDS
                    .iter()
                    .filter(|k| k.is_series())
                    .fold(0, |acc, k| acc | k.bit()),
            ),
            _ => return Kind::from_name(&lower).map(TypeSet::of),
        };
        Some(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_sorts_first() {
        for kind in Kind::all().iter().skip(1) {
            assert!(Kind::End < *kind);
        }
    }

    #[test]
    fn test_name_round_trip_skips_internal() {
        assert_eq!(Kind::from_name("integer!"), Some(Kind::Integer));
        assert_eq!(Kind::from_name("SET-WORD!"), Some(Kind::SetWord));
        assert_eq!(Kind::from_name("end!"), None);
        assert_eq!(Kind::from_name("trash!"), None);
    }

    #[test]
    fn test_any_value_excludes_internal_kinds() {
        assert!(!TypeSet::ANY_VALUE.contains(Kind::End));
        assert!(!TypeSet::ANY_VALUE.contains(Kind::Trash));
        assert!(TypeSet::ANY_VALUE.contains(Kind::Void));
        assert!(!TypeSet::any_value_except_void().contains(Kind::Void));
    }

    #[test]
    fn test_any_word_membership() {
        for kind in Kind::all() {
            assert_eq!(TypeSet::ANY_WORD.contains(*kind), kind.is_word());
        }
    }

    #[test]
    fn test_typeset_names() {
        let numbers = TypeSet::from_name("any-number!").unwrap();
        assert!(numbers.contains(Kind::Integer));
        assert!(numbers.contains(Kind::Decimal));
        assert!(!numbers.contains(Kind::Block));
        assert_eq!(TypeSet::from_name("block!"), Some(TypeSet::of(Kind::Block)));
        assert!(TypeSet::from_name("nonsense!").is_none());
    }
}
