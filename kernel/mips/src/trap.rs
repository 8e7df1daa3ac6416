//! Data Structures for handling trap information

/// Generate an enum with explicit discriminants together with a `TryFrom<usize>` implementation that maps the
/// discriminants back to variants.
macro_rules! back_to_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident {
        $($(#[$vmeta:meta])* $vname:ident $(= $val:expr)?,)*
    }) => {
        $(#[$meta])*
        $vis enum $name {
            $($(#[$vmeta])* $vname $(= $val)?,)*
        }

        impl core::convert::TryFrom<usize> for $name {
            type Error = ();

            fn try_from(v: usize) -> Result<Self, Self::Error> {
                match v {
                    $(x if x == $name::$vname as usize => Ok($name::$vname),)*
                    _ => Err(()),
                }
            }
        }
    }
}

back_to_enum! {
    /// The kind of memory access that caused a TLB exception.
    ///
    /// The trap dispatcher derives it from the exception code of the cause register and passes it to the vm fault
    /// handler as a raw number.
    #[repr(usize)]
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub enum VmFaultType {
        /// A load or instruction fetch missed the TLB
        Read = 0,
        /// A store missed the TLB
        Write = 1,
        /// A store hit a TLB entry whose `Dirty` bit is clear
        ReadOnly = 2,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fault_codes_are_decoded() {
        assert_eq!(VmFaultType::try_from(0), Ok(VmFaultType::Read));
        assert_eq!(VmFaultType::try_from(1), Ok(VmFaultType::Write));
        assert_eq!(VmFaultType::try_from(2), Ok(VmFaultType::ReadOnly));
        assert_eq!(VmFaultType::try_from(3), Err(()));
    }
}
