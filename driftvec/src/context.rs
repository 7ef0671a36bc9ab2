use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::io::{read_usize, write_usize, ReadModelBinary, WriteModelBinary};

/// Chooses how many neighbors to the left and right of a focus position
/// take part in training.
#[derive(Debug)]
pub enum ContextStrategy<R> {
    /// A fixed symmetric window.
    Static { symm_context: usize },

    /// A window size drawn uniformly from `[1, symm_context]` for every
    /// focus position (Mikolov, 2013).
    Dynamic { symm_context: usize, rng: R },
}

impl<R> ContextStrategy<R>
where
    R: Rng,
{
    pub fn fixed(symm_context: usize) -> Self {
        ContextStrategy::Static { symm_context }
    }

    pub fn dynamic(symm_context: usize, rng: R) -> Self {
        ContextStrategy::Dynamic { symm_context, rng }
    }

    /// Number of words in the left and right context, given that at most
    /// `avail_left` and `avail_right` words are available on either side.
    ///
    /// Returns `(0, 0)` if the configured window is zero.
    pub fn size(&mut self, avail_left: usize, avail_right: usize) -> (usize, usize) {
        match self {
            ContextStrategy::Static { symm_context } => {
                if *symm_context == 0 {
                    (0, 0)
                } else {
                    (avail_left.min(*symm_context), avail_right.min(*symm_context))
                }
            }
            ContextStrategy::Dynamic { symm_context, rng } => {
                if *symm_context == 0 {
                    (0, 0)
                } else {
                    let drawn = rng.gen_range(1..=*symm_context);
                    (avail_left.min(drawn), avail_right.min(drawn))
                }
            }
        }
    }

    pub fn symm_context(&self) -> usize {
        match self {
            ContextStrategy::Static { symm_context } => *symm_context,
            ContextStrategy::Dynamic { symm_context, .. } => *symm_context,
        }
    }
}

impl<R> PartialEq for ContextStrategy<R> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ContextStrategy::Static { symm_context },
                ContextStrategy::Static {
                    symm_context: other_context,
                },
            ) => symm_context == other_context,
            (
                ContextStrategy::Dynamic { symm_context, .. },
                ContextStrategy::Dynamic {
                    symm_context: other_context,
                    ..
                },
            ) => symm_context == other_context,
            _ => false,
        }
    }
}

impl<W, R> WriteModelBinary<W> for ContextStrategy<R>
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        match self {
            ContextStrategy::Static { symm_context } => {
                write.write_u8(0)?;
                write_usize(write, *symm_context)?;
            }
            ContextStrategy::Dynamic { symm_context, .. } => {
                write.write_u8(1)?;
                write_usize(write, *symm_context)?;
            }
        }
        Ok(())
    }
}

impl<RD, R> ReadModelBinary<RD> for ContextStrategy<R>
where
    RD: Read,
    R: Rng + SeedableRng,
{
    fn read_model_binary(read: &mut RD) -> Result<Self> {
        match read.read_u8()? {
            0 => Ok(ContextStrategy::Static {
                symm_context: read_usize(read)?,
            }),
            1 => Ok(ContextStrategy::Dynamic {
                symm_context: read_usize(read)?,
                rng: R::from_entropy(),
            }),
            tag => Err(Error::deserialize(format!(
                "unknown context strategy tag: {}",
                tag
            ))),
        }
    }
}
