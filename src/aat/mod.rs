//! Apple Advanced Typography: morx substitution, kerx/kern kerning,
//! tracking and anchor attachment.

pub mod kern;
pub mod kerx;
pub mod map;
pub mod morx;
pub mod trak;

use read_fonts::tables::ankr::Ankr;
use read_fonts::tables::feat::Feat;
use read_fonts::tables::kern::Kern;
use read_fonts::tables::kerx::Kerx;
use read_fonts::tables::morx::Morx;
use read_fonts::tables::trak::Trak;
use read_fonts::{FontRef, TableProvider};

#[derive(Clone, Default)]
pub(crate) struct AatTables<'a> {
    pub morx: Option<Morx<'a>>,
    pub ankr: Option<Ankr<'a>>,
    pub kern: Option<Kern<'a>>,
    pub kerx: Option<Kerx<'a>>,
    pub trak: Option<Trak<'a>>,
    pub feat: Option<Feat<'a>>,
}

impl<'a> AatTables<'a> {
    pub fn new(font: &FontRef<'a>) -> Self {
        Self {
            morx: font.morx().ok(),
            ankr: font.ankr().ok(),
            kern: font.kern().ok(),
            kerx: font.kerx().ok(),
            trak: font.trak().ok(),
            feat: font.feat().ok(),
        }
    }
}
