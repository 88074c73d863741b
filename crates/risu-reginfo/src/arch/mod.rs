pub mod ppc64;
pub mod x86_64;
