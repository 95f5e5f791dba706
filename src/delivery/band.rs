//! # 分段重组引擎
//!
//! ## 设计思路
//!
//! 源站的混淆方式：把图片自底向上切成 `num` 条等高横带并倒序排列，
//! 不能整除的余数行并入重组后最顶部的那一条，其余各条的目标偏移整体下移余数行。
//!
//! 重组是闭式逆置换，不做搜索，也不依赖 `num` 的来源：
//!
//! ```text
//! move  = h / num
//! over  = h % num
//! first = (i == 0) as u32
//!
//! src_start = h - move * (i + 1) - over
//! len       = move + over * first
//! dst_start = move * i + over * (1 - first)
//! ```
//!
//! 每条横带都是整行，因此源与目标在缓冲区中都是连续切片，一次 `copy_from_slice` 完成。

use super::{DeliveryError, RasterImage};

/// 横带数量。`0` 表示未混淆。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BandCount(u32);

impl BandCount {
    pub const NONE: Self = Self(0);

    pub const fn new(num: u32) -> Self {
        Self(num)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_scrambled(self) -> bool {
        self.0 > 0
    }
}

impl From<u32> for BandCount {
    fn from(num: u32) -> Self {
        Self(num)
    }
}

impl std::fmt::Display for BandCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 单条横带：源起始行、行数、目标起始行。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandSegment {
    pub src_start: u32,
    pub len: u32,
    pub dst_start: u32,
}

/// 由 `(h, num)` 推导出的完整横带计划。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPlan {
    height: u32,
    segments: Vec<BandSegment>,
}

impl BandPlan {
    /// 计算横带计划。
    ///
    /// `num == 0`、`height == 0` 或 `num > height` 均视为非法参数。
    pub fn compute(height: u32, num: BandCount) -> Result<Self, DeliveryError> {
        let num = num.get();
        if height == 0 {
            return Err(DeliveryError::MalformedParameter("图片高度为 0".to_string()));
        }
        if num == 0 {
            return Err(DeliveryError::MalformedParameter("横带数量为 0 时无需计划".to_string()));
        }
        if num > height {
            return Err(DeliveryError::MalformedParameter(format!(
                "横带数量 {} 超过图片高度 {}",
                num, height
            )));
        }

        let step = height / num;
        let over = height % num;

        let segments = (0..num)
            .map(|i| {
                let first = u32::from(i == 0);
                BandSegment {
                    src_start: height - step * (i + 1) - over,
                    len: step + over * first,
                    dst_start: step * i + over * (1 - first),
                }
            })
            .collect();

        Ok(Self { height, segments })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn segments(&self) -> &[BandSegment] {
        &self.segments
    }
}

/// 按横带计划还原被混淆的图片。
///
/// `num == 0` 时原样返回输入；否则分配同尺寸新缓冲并逐条拷贝。
pub fn reconstruct(image: RasterImage, num: BandCount) -> Result<RasterImage, DeliveryError> {
    if !num.is_scrambled() {
        return Ok(image);
    }

    let plan = BandPlan::compute(image.height(), num)?;
    permute(&image, &plan, |segment| (segment.src_start, segment.dst_start))
}

/// 正向混淆，即 [`reconstruct`] 的逆变换。
///
/// 用于构造测试样本与命令行的 `scramble` 子命令。
pub fn scramble(image: RasterImage, num: BandCount) -> Result<RasterImage, DeliveryError> {
    if !num.is_scrambled() {
        return Ok(image);
    }

    let plan = BandPlan::compute(image.height(), num)?;
    permute(&image, &plan, |segment| (segment.dst_start, segment.src_start))
}

/// `select` 返回 `(读取起始行, 写入起始行)`。
fn permute<S>(image: &RasterImage, plan: &BandPlan, select: S) -> Result<RasterImage, DeliveryError>
where
    S: Fn(&BandSegment) -> (u32, u32),
{
    let stride = image.stride();
    let source = image.as_bytes();
    let mut output = vec![0u8; source.len()];

    for segment in plan.segments() {
        let (read_row, write_row) = select(segment);
        let len = segment.len as usize * stride;
        let read = read_row as usize * stride;
        let write = write_row as usize * stride;

        output[write..write + len].copy_from_slice(&source[read..read + len]);
    }

    RasterImage::from_rgb8(image.width(), image.height(), output)
}
