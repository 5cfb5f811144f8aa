/// Declares a configuration selector: a closed set of choices parsed from a
/// free-form string. Matching is case-insensitive and never fails; anything
/// unrecognized resolves to the declared default.
macro_rules! selector {
    (
        $(#[$meta: meta])*
        pub enum $name: ident {
            $($(#[$vmeta: meta])* $variant: ident = $value: literal [$($alias: literal),+]),+ $(,)?
        }
        default = $default: ident;
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($($alias)|+ => Self::$variant,)+
                    _ => Self::$default,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use selector;

#[cfg(test)]
mod tests {
    selector! {
        /// Test selector.
        pub enum Shade {
            /// Documented variant.
            Light = "light" ["light", "pale"],
            #[allow(dead_code)]
            Dark = "dark" ["dark"],
        }
        default = Dark;
    }

    #[test]
    fn test_documented_variants() {
        assert_eq!(Shade::from(" Pale "), Shade::Light);
        assert_eq!(Shade::from("unknown"), Shade::Dark);
        assert_eq!(Shade::Light.to_string(), "light");
        assert_eq!(Shade::default().as_str(), "dark");
    }
}
