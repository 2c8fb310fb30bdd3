//! 进程地址空间布局
//!
//! ```text
//! vpn 0                                              num_pages-1
//! | 段 0 | 段 1 | ... | 栈 (stack_pages 页) | 参数页 |
//!                                          ^initial_sp
//! ```
//!
//! 参数页的内容：`argc` 个 4 字节小端指针，随后是以 NUL 结尾的各个参数字符串。

use crate::address::{PageNum, Vpn};
use crate::error::LoadError;
use crate::image::{ExecutableImage, Section};

/// 每个参数在参数页中占用的指针字节数
pub const ARG_POINTER_SIZE: usize = 4;

/// 进程地址空间布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLayout {
    /// 页表长度
    pub num_pages: usize,
    /// 段（从第 0 页开始连续排布）
    pub sections: Vec<Section>,
    /// 栈页数
    pub stack_pages: usize,
    /// 初始 PC
    pub initial_pc: usize,
    /// 初始栈指针（栈顶，即参数页起始地址）
    pub initial_sp: usize,
    /// 参数个数
    pub argc: usize,
    /// 参数指针数组的虚拟地址
    pub argv: usize,
}

impl AddressLayout {
    /// 根据映像和参数计算布局。
    ///
    /// 段必须从第 0 页开始连续排布，参数必须能放进一页。
    pub fn new(
        image: &dyn ExecutableImage,
        args: &[&str],
        page_size: usize,
        stack_pages: usize,
    ) -> Result<Self, LoadError> {
        let mut next = Vpn(0);
        for (i, section) in image.sections().iter().enumerate() {
            if section.first_vpn != next {
                return Err(LoadError::Fragmented {
                    section: i,
                    expected: next,
                    found: section.first_vpn,
                });
            }
            next = section.end_vpn();
        }

        let args_size = arguments_size(args);
        if args_size > page_size {
            return Err(LoadError::ArgumentsTooLong {
                size: args_size,
                page_size,
            });
        }

        let num_pages = next.as_usize() + stack_pages + 1;
        let initial_sp = (num_pages - 1) * page_size;
        Ok(AddressLayout {
            num_pages,
            sections: image.sections().to_vec(),
            stack_pages,
            initial_pc: image.entry_point(),
            initial_sp,
            argc: args.len(),
            argv: initial_sp,
        })
    }

    /// 参数页的虚拟页号
    pub fn argument_vpn(&self) -> Vpn {
        Vpn(self.num_pages - 1)
    }

    /// 包含 `vpn` 的段：(段序号, 段内页号)。栈页和参数页返回 None。
    pub fn section_for(&self, vpn: Vpn) -> Option<(usize, usize)> {
        self.sections
            .iter()
            .position(|s| s.contains(vpn))
            .map(|i| (i, vpn.diff(self.sections[i].first_vpn) as usize))
    }

    /// `vpn` 是否属于只读段
    pub fn is_read_only(&self, vpn: Vpn) -> bool {
        self.section_for(vpn)
            .is_some_and(|(i, _)| self.sections[i].read_only)
    }
}

/// 参数在参数页中占用的总字节数
pub fn arguments_size(args: &[&str]) -> usize {
    args.iter().map(|a| ARG_POINTER_SIZE + a.len() + 1).sum()
}

/// 生成参数页的内容（不补齐到整页）。
///
/// `argv` 是参数页的虚拟地址；指针指向同一页中字符串的虚拟地址。
pub fn encode_arguments(args: &[&str], argv: usize) -> Vec<u8> {
    let strings_offset = args.len() * ARG_POINTER_SIZE;
    let mut pointers = Vec::with_capacity(strings_offset);
    let mut strings = Vec::new();
    for arg in args {
        let addr = (argv + strings_offset + strings.len()) as u32;
        pointers.extend_from_slice(&addr.to_le_bytes());
        strings.extend_from_slice(arg.as_bytes());
        strings.push(0);
    }
    pointers.extend_from_slice(&strings);
    pointers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::StaticImage;

    #[test]
    fn test_layout_page_counts() {
        let image = StaticImage::builder(64)
            .section(".text", vec![0; 100], true)
            .section(".data", vec![0; 10], false)
            .entry_point(8)
            .build();
        let layout = AddressLayout::new(&image, &["prog", "x"], 64, 8).unwrap();
        assert_eq!(layout.num_pages, 3 + 8 + 1);
        assert_eq!(layout.initial_sp, 11 * 64);
        assert_eq!(layout.argv, layout.initial_sp);
        assert_eq!(layout.argc, 2);
        assert_eq!(layout.initial_pc, 8);
        assert_eq!(layout.argument_vpn(), Vpn(11));

        assert_eq!(layout.section_for(Vpn(1)), Some((0, 1)));
        assert_eq!(layout.section_for(Vpn(2)), Some((1, 0)));
        assert_eq!(layout.section_for(Vpn(3)), None);
        assert!(layout.is_read_only(Vpn(0)));
        assert!(!layout.is_read_only(Vpn(2)));
        assert!(!layout.is_read_only(Vpn(11)));
    }

    #[test]
    fn test_fragmented_image_rejected() {
        let gap = Section {
            name: ".data".into(),
            first_vpn: Vpn(3),
            num_pages: 1,
            read_only: false,
        };
        let text = Section {
            name: ".text".into(),
            first_vpn: Vpn(0),
            num_pages: 2,
            read_only: true,
        };
        let image = StaticImage::from_sections(64, 0, vec![(text, vec![]), (gap, vec![])]);
        assert_eq!(
            AddressLayout::new(&image, &[], 64, 8),
            Err(LoadError::Fragmented {
                section: 1,
                expected: Vpn(2),
                found: Vpn(3),
            })
        );
    }

    #[test]
    fn test_arguments_must_fit_one_page() {
        let image = StaticImage::builder(16).build();
        // 4 + 10 + 1 = 15 字节，放得下
        assert!(AddressLayout::new(&image, &["0123456789"], 16, 1).is_ok());
        // 4 + 11 + 1 = 16 字节，恰好一页
        assert!(AddressLayout::new(&image, &["0123456789a"], 16, 1).is_ok());
        assert_eq!(
            AddressLayout::new(&image, &["0123456789ab"], 16, 1),
            Err(LoadError::ArgumentsTooLong { size: 17, page_size: 16 })
        );
    }

    #[test]
    fn test_encode_arguments() {
        let page = encode_arguments(&["ab", "c"], 0x400);
        assert_eq!(page.len(), 8 + 3 + 2);
        assert_eq!(u32::from_le_bytes(page[0..4].try_into().unwrap()), 0x408);
        assert_eq!(u32::from_le_bytes(page[4..8].try_into().unwrap()), 0x40b);
        assert_eq!(&page[8..], b"ab\0c\0");
    }
}
