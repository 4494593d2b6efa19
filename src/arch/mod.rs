/*
 * Architecture Support
 *
 * Architecture-specific code lives under this module. TERN currently
 * targets x86_64 only; everything above `arch` is portable and reaches
 * the hardware exclusively through the interfaces exported here.
 */

pub mod x86_64;
