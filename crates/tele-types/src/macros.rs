/// Declares a fieldless enum whose discriminants are the values it is stored as in target
/// memory, together with the conversions to and from that representation.
///
/// Used for [`Kind`](crate::Kind), [`ObjectKind`](crate::ObjectKind) and
/// [`WordType`](crate::WordType), which the target's class metadata and object headers store
/// as raw tags.
macro_rules! tagged_type {
    (
        repr: $repr_ty:ty;
        $(#[$attr:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$id_attr:meta])*
                $var:ident = $val:literal
            ),+ $(,)?
        }
    ) => {
        #[repr($repr_ty)]
        $(#[$attr])*
        $vis enum $name {
            $(
                $(#[$id_attr])*
                $var = $val,
            )*
        }

        impl $name {
            /// Every variant, in declaration order
            pub const VALUES: &'static [$name] = &[$($name::$var),*];
        }

        impl From<$name> for $repr_ty {
            fn from(var: $name) -> Self {
                var as $repr_ty
            }
        }

        impl TryFrom<$repr_ty> for $name {
            type Error = $crate::UnknownTagError<$repr_ty>;

            fn try_from(value: $repr_ty) -> Result<Self, Self::Error> {
                match value {
                    $(
                    $val => Ok($name::$var),
                    )*
                    unknown => Err($crate::UnknownTagError(unknown)),
                }
            }
        }
    };
    (
        $(#[$attr:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$id_attr:meta])*
                $var:ident = $val:literal
            ),+ $(,)?
        }
    ) => {
        $crate::macros::tagged_type! {
            repr: u8;
            $(#[$attr])*
            $vis enum $name {
                $(
                    $(#[$id_attr])*
                    $var = $val
                ),*
            }
        }
    };
}

pub(crate) use tagged_type;
