// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Defines an "open" wire enumeration: a transparent newtype over an integer
/// with named associated constants.
///
/// Unlike a Rust `enum`, any integer value is representable, so a value
/// read off the wire never needs validation to be stored. The constants can
/// be used as `match` patterns.
macro_rules! wire_enum {
    (
        $(#[$attr:meta])*
        $vis:vis enum $name:ident: $repr:ty {
            $(
                $(#[$variant_attr:meta])*
                $variant:ident = $value:expr,
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            ::zerocopy::IntoBytes,
            ::zerocopy::FromBytes,
            ::zerocopy::Immutable,
            ::zerocopy::KnownLayout,
        )]
        #[repr(transparent)]
        $vis struct $name(pub $repr);

        #[allow(missing_docs)]
        impl $name {
            $(
                $(#[$variant_attr])*
                pub const $variant: $name = $name($value);
            )*

            /// Returns the name of the value, if it is a known one.
            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some(stringify!($variant)),)*
                    _ => None,
                }
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self.name() {
                    Some(name) => f.write_str(name),
                    None => write!(f, "{}({:#x})", stringify!($name), self.0),
                }
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}
