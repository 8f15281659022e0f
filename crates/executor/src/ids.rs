/// Declares `NonZeroU32` id newtypes and the `Index` impls resolving them against a container field.
///
/// Ids are stored shifted by one so that `Option<Id>` stays the size of the id itself.
macro_rules! id_newtypes {
    ($($ty:ident.$field:ident[$name:ident] => $output:ty,)*) => {
        $(
            #[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
            pub struct $name(std::num::NonZeroU32);

            impl From<usize> for $name {
                fn from(value: usize) -> Self {
                    Self(
                        u32::try_from(value)
                            .ok()
                            .and_then(|value| std::num::NonZeroU32::new(value + 1))
                            .expect(concat!("Too many ", stringify!($name))),
                    )
                }
            }

            impl From<$name> for usize {
                fn from(id: $name) -> Self {
                    (id.0.get() - 1) as usize
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    let name = stringify!($name);
                    write!(f, "{}#{}", name.strip_suffix("Id").unwrap_or(name), usize::from(*self))
                }
            }

            impl std::ops::Index<$name> for $ty {
                type Output = $output;

                fn index(&self, index: $name) -> &Self::Output {
                    &self.$field[usize::from(index)]
                }
            }
        )*
    };
}

pub(crate) use id_newtypes;
