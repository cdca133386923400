//! Fixed virtual addresses inside the host executable.
//!
//! Every value is specific to one build of the game. The build is chosen at
//! compile time with the `gothic1` / `gothic2` features; `gothic1` wins when
//! both are enabled.

/// A hookable function entry and the number of whole instruction bytes that
/// get moved into its trampoline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionLocation {
    pub name: &'static str,
    pub addr: usize,
    pub prologue_len: usize,
}

#[allow(unused)]
mod gothic1_08k {
    use super::FunctionLocation;

    pub const BUILD_NAME: &str = "Gothic 1.08k_mod";
    pub const IMAGE_BASE: usize = 0x00400000;

    pub mod zcview {
        use super::FunctionLocation;

        pub const SET_MODE: FunctionLocation = FunctionLocation {
            name: "zCView::SetMode",
            addr: 0x00702180,
            prologue_len: 7,
        };
        pub const SET_MODE_LEN: usize = 0x1b9;
        pub const REPL_SET_MODE_MODECHANGE_START: usize = 0x00702206;
        pub const REPL_SET_MODE_MODECHANGE_END: usize = 0x00702220;
        pub const PRINT_CHARS: FunctionLocation = FunctionLocation {
            name: "zCView::PrintChars",
            addr: 0x006ffc20,
            prologue_len: 6,
        };
    }

    pub mod zcrnd_d3d {
        use super::FunctionLocation;

        pub const BEGIN_FRAME: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::BeginFrame",
            addr: 0x0071f8f0,
            prologue_len: 6,
        };
        pub const END_FRAME: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::EndFrame",
            addr: 0x0071fc10,
            prologue_len: 6,
        };
        pub const VID_BLIT: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::Vid_Blit",
            addr: 0x00721b10,
            prologue_len: 7,
        };
        pub const SET_ALPHA_BLEND_FUNC: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::SetAlphaBlendFunc",
            addr: 0x00720a80,
            prologue_len: 5,
        };
        pub const DRAW_POLY_SIMPLE: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::DrawPolySimple",
            addr: 0x00716da0,
            prologue_len: 6,
        };
        pub const VID_GET_FRONT_BUFFER_COPY: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::Vid_GetFrontBufferCopy",
            addr: 0x00722730,
            prologue_len: 7,
        };
    }
}

#[allow(unused)]
mod gothic2_6_fix {
    use super::FunctionLocation;

    pub const BUILD_NAME: &str = "Gothic II 2.6 (fix)";
    pub const IMAGE_BASE: usize = 0x00400000;

    pub mod zcview {
        use super::FunctionLocation;

        pub const SET_MODE: FunctionLocation = FunctionLocation {
            name: "zCView::SetMode",
            addr: 0x007abdb0,
            prologue_len: 7,
        };
        pub const SET_MODE_LEN: usize = 0x1b9;
        pub const REPL_SET_MODE_MODECHANGE_START: usize = 0x007abe36;
        pub const REPL_SET_MODE_MODECHANGE_END: usize = 0x007abe50;
        pub const PRINT_CHARS: FunctionLocation = FunctionLocation {
            name: "zCView::PrintChars",
            addr: 0x007a9b10,
            prologue_len: 6,
        };
    }

    pub mod zcrnd_d3d {
        use super::FunctionLocation;

        pub const BEGIN_FRAME: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::BeginFrame",
            addr: 0x0064dd20,
            prologue_len: 6,
        };
        pub const END_FRAME: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::EndFrame",
            addr: 0x0064dec0,
            prologue_len: 6,
        };
        pub const VID_BLIT: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::Vid_Blit",
            addr: 0x00658430,
            prologue_len: 7,
        };
        pub const SET_ALPHA_BLEND_FUNC: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::SetAlphaBlendFunc",
            addr: 0x00654a30,
            prologue_len: 5,
        };
        pub const DRAW_POLY_SIMPLE: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::DrawPolySimple",
            addr: 0x0064ab60,
            prologue_len: 6,
        };
        pub const VID_GET_FRONT_BUFFER_COPY: FunctionLocation = FunctionLocation {
            name: "zCRnd_D3D::Vid_GetFrontBufferCopy",
            addr: 0x00659b00,
            prologue_len: 7,
        };
    }
}

#[cfg(feature = "gothic1")]
pub use gothic1_08k::*;
#[cfg(not(feature = "gothic1"))]
pub use gothic2_6_fix::*;

/// Every entry point the renderer hooks, in install order.
pub const HOOKED_FUNCTIONS: [FunctionLocation; 8] = [
    zcview::SET_MODE,
    zcview::PRINT_CHARS,
    zcrnd_d3d::BEGIN_FRAME,
    zcrnd_d3d::END_FRAME,
    zcrnd_d3d::VID_BLIT,
    zcrnd_d3d::SET_ALPHA_BLEND_FUNC,
    zcrnd_d3d::DRAW_POLY_SIMPLE,
    zcrnd_d3d::VID_GET_FRONT_BUFFER_COPY,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_change_range_lies_inside_set_mode() {
        let start = zcview::SET_MODE.addr;
        let end = start + zcview::SET_MODE_LEN;
        assert!(zcview::SET_MODE.addr + zcview::SET_MODE.prologue_len
            <= zcview::REPL_SET_MODE_MODECHANGE_START);
        assert!(zcview::REPL_SET_MODE_MODECHANGE_START < zcview::REPL_SET_MODE_MODECHANGE_END);
        assert!(zcview::REPL_SET_MODE_MODECHANGE_END <= end);
    }

    #[test]
    fn hooked_functions_do_not_overlap() {
        let mut functions = HOOKED_FUNCTIONS.to_vec();
        functions.sort_by_key(|f| f.addr);
        for pair in functions.windows(2) {
            assert!(
                pair[0].addr + pair[0].prologue_len <= pair[1].addr,
                "{} overlaps {}",
                pair[0].name,
                pair[1].name
            );
        }
        assert!(functions
            .iter()
            .all(|f| f.prologue_len >= 5 && f.addr > IMAGE_BASE));
    }
}
