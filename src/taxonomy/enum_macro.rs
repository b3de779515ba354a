/// Declares a closed label enum with a wire label, a display name and optional aliases.
///
/// Serializes as the wire label. Deserialization and `from_name` accept the label,
/// the display name and every alias.
#[macro_export]
macro_rules! define_label_enum {
    (
        $(#[$enum_meta:meta])*
        $enum_name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $label:literal : $display_name:literal
                $( | $alias:literal )*
            ),* $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $enum_name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl ::serde::Serialize for $enum_name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $enum_name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_name(&s).ok_or_else(|| {
                    ::serde::de::Error::custom(format!(
                        "unknown {}: {}",
                        stringify!($enum_name),
                        s
                    ))
                })
            }
        }

        impl $enum_name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant => $label,
                    )*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant => $display_name,
                    )*
                }
            }

            #[allow(unreachable_patterns)]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(
                        $label | $display_name $(| $alias)* => Some(Self::$variant),
                    )*
                    _ => None,
                }
            }

            pub fn all_variants() -> &'static [Self] {
                &[
                    $(
                        Self::$variant,
                    )*
                ]
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

/// Declares the closed resource catalog. Every entry names its exact type identifier,
/// its provider and its category, so a type without a category cannot be written down.
#[macro_export]
macro_rules! define_resource_types {
    (
        $(#[$enum_meta:meta])*
        $enum_name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $type_id:literal : $provider:ident / $category:ident
            ),* $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $enum_name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl ::serde::Serialize for $enum_name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $enum_name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_type_str(&s).ok_or_else(|| {
                    ::serde::de::Error::custom(format!("unknown resource type: {}", s))
                })
            }
        }

        impl $enum_name {
            /// Exact type identifier, e.g. `aws_db_instance`.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant => $type_id,
                    )*
                }
            }

            pub fn from_type_str(type_id: &str) -> Option<Self> {
                match type_id {
                    $(
                        $type_id => Some(Self::$variant),
                    )*
                    _ => None,
                }
            }

            pub fn provider(&self) -> $crate::taxonomy::Provider {
                match self {
                    $(
                        Self::$variant => $crate::taxonomy::Provider::$provider,
                    )*
                }
            }

            pub fn category(&self) -> $crate::taxonomy::Category {
                match self {
                    $(
                        Self::$variant => $crate::taxonomy::Category::$category,
                    )*
                }
            }

            pub fn all_variants() -> &'static [Self] {
                &[
                    $(
                        Self::$variant,
                    )*
                ]
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}
