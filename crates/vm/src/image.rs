//! 可执行映像接口
//!
//! 分页核心对可执行文件格式一无所知，只需要两件事：
//! 段的布局（起始页、页数、是否只读），以及"把某段的第 N 页装入这一帧"。

use crate::address::Vpn;

/// 可执行映像中的一个段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// 段名（用于日志）
    pub name: String,
    /// 段的第一个虚拟页
    pub first_vpn: Vpn,
    /// 段的页数
    pub num_pages: usize,
    /// 是否只读
    pub read_only: bool,
}

impl Section {
    /// 段之后的第一个虚拟页
    pub fn end_vpn(&self) -> Vpn {
        self.first_vpn + self.num_pages
    }

    /// 段是否包含 `vpn`
    pub fn contains(&self, vpn: Vpn) -> bool {
        self.first_vpn <= vpn && vpn < self.end_vpn()
    }
}

/// 可执行映像
pub trait ExecutableImage: Send + Sync {
    /// 段列表
    fn sections(&self) -> &[Section];

    /// 程序入口地址
    fn entry_point(&self) -> usize;

    /// 把第 `section` 段的第 `page` 页的初始内容装入 `frame`。
    ///
    /// `frame` 长度等于页大小；返回 false 表示读取失败。
    fn load_page(&self, section: usize, page: usize, frame: &mut [u8]) -> bool;
}

/// 内存中的可执行映像：每段一个字节数组，按页切分
#[derive(Debug, Clone)]
pub struct StaticImage {
    sections: Vec<Section>,
    contents: Vec<Vec<u8>>,
    entry_point: usize,
    page_size: usize,
}

impl StaticImage {
    /// 按给定布局直接构造（不检查段是否连续）
    pub fn from_sections(
        page_size: usize,
        entry_point: usize,
        sections: Vec<(Section, Vec<u8>)>,
    ) -> Self {
        let (sections, contents) = sections.into_iter().unzip();
        StaticImage {
            sections,
            contents,
            entry_point,
            page_size,
        }
    }

    /// 从第 0 页开始依次排布各段的构建器
    pub fn builder(page_size: usize) -> StaticImageBuilder {
        StaticImageBuilder {
            page_size,
            entry_point: 0,
            next_vpn: Vpn(0),
            sections: Vec::new(),
        }
    }

    /// 段总页数
    pub fn total_pages(&self) -> usize {
        self.sections.iter().map(|s| s.num_pages).sum()
    }
}

impl ExecutableImage for StaticImage {
    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn entry_point(&self) -> usize {
        self.entry_point
    }

    fn load_page(&self, section: usize, page: usize, frame: &mut [u8]) -> bool {
        let (Some(s), Some(bytes)) = (self.sections.get(section), self.contents.get(section)) else {
            return false;
        };
        if page >= s.num_pages || frame.len() != self.page_size {
            return false;
        }
        frame.fill(0);
        let start = (page * self.page_size).min(bytes.len());
        let end = ((page + 1) * self.page_size).min(bytes.len());
        frame[..end - start].copy_from_slice(&bytes[start..end]);
        true
    }
}

/// [`StaticImage`] 构建器
#[derive(Debug)]
pub struct StaticImageBuilder {
    page_size: usize,
    entry_point: usize,
    next_vpn: Vpn,
    sections: Vec<(Section, Vec<u8>)>,
}

impl StaticImageBuilder {
    /// 追加一个段，页数由内容长度向上取整（至少一页）
    pub fn section(mut self, name: &str, bytes: Vec<u8>, read_only: bool) -> Self {
        let num_pages = bytes.len().div_ceil(self.page_size).max(1);
        self.push(name, num_pages, bytes, read_only);
        self
    }

    /// 追加一个指定页数的段（如未初始化数据段）
    pub fn section_pages(mut self, name: &str, num_pages: usize, bytes: Vec<u8>, read_only: bool) -> Self {
        let num_pages = num_pages.max(bytes.len().div_ceil(self.page_size));
        self.push(name, num_pages, bytes, read_only);
        self
    }

    /// 设置入口地址
    pub fn entry_point(mut self, entry_point: usize) -> Self {
        self.entry_point = entry_point;
        self
    }

    fn push(&mut self, name: &str, num_pages: usize, bytes: Vec<u8>, read_only: bool) {
        let section = Section {
            name: name.to_string(),
            first_vpn: self.next_vpn,
            num_pages,
            read_only,
        };
        self.next_vpn = self.next_vpn + num_pages;
        self.sections.push((section, bytes));
    }

    /// 完成构建
    pub fn build(self) -> StaticImage {
        StaticImage::from_sections(self.page_size, self.entry_point, self.sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_lays_out_contiguously() {
        let image = StaticImage::builder(16)
            .section(".text", vec![1; 40], true)
            .section(".data", vec![2; 5], false)
            .section_pages(".bss", 2, Vec::new(), false)
            .entry_point(4)
            .build();
        let s = image.sections();
        assert_eq!(s.len(), 3);
        assert_eq!((s[0].first_vpn, s[0].num_pages), (Vpn(0), 3));
        assert_eq!((s[1].first_vpn, s[1].num_pages), (Vpn(3), 1));
        assert_eq!((s[2].first_vpn, s[2].num_pages), (Vpn(4), 2));
        assert_eq!(image.total_pages(), 6);
        assert_eq!(image.entry_point(), 4);
        assert!(s[0].contains(Vpn(2)) && !s[0].contains(Vpn(3)));
    }

    #[test]
    fn test_load_page_pads_with_zeros() {
        let image = StaticImage::builder(16)
            .section(".text", (0..20).collect(), true)
            .build();
        let mut frame = [0xffu8; 16];
        assert!(image.load_page(0, 1, &mut frame));
        assert_eq!(&frame[..4], &[16, 17, 18, 19]);
        assert!(frame[4..].iter().all(|&b| b == 0));

        assert!(!image.load_page(0, 2, &mut frame));
        assert!(!image.load_page(1, 0, &mut frame));
    }
}
