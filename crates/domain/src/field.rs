use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// フィルタ・パッチの各フィールドに使う三値ラッパー
///
/// `Unset` は「指定なし」、`Set(v)` は「値 v が指定された」を表します。
/// `Field<Option<T>>` とすることで「明示的な null」(`Set(None)`) を
/// 「指定なし」(`Unset`) と区別できます。
///
/// 構造体のフィールドとして使う場合は
/// `#[serde(default, skip_serializing_if = "Field::is_unset")]` を付けてください。
/// キーが無ければ `Unset`、`null` なら `Set(None)`、値があれば `Set(v)` になります。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Field<T> {
    #[default]
    Unset,
    Set(T),
}

impl<T> Field<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Field::Set(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    /// 指定されていれば値への参照を返す
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Field::Set(value) => Some(value),
            Field::Unset => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Set(value) => Some(value),
            Field::Unset => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Set(value) => Field::Set(f(value)),
            Field::Unset => Field::Unset,
        }
    }

    /// 指定されていれば `target` を上書きし、上書きしたかどうかを返す
    pub fn assign_to(self, target: &mut T) -> bool {
        match self {
            Field::Set(value) => {
                *target = value;
                true
            }
            Field::Unset => false,
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Set(value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Set(value) => value.serialize(serializer),
            // skip_serializing_if を付け忘れた場合のみここに来る
            Field::Unset => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Field::Set)
    }
}
