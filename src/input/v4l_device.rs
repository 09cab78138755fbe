// 该文件是 Tanzhao （探照） 项目的一部分。
// src/input/v4l_device.rs - V4L2 摄像头设备
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use image::RgbImage;
use ouroboros::self_referencing;
use tracing::{info, warn};
use v4l::{buffer::Type, io::traits::CaptureStream, prelude::MmapStream, video::Capture};

use super::{CaptureDevice, InputError};

const V4L_BUFFER_COUNT: u32 = 4;

#[self_referencing]
struct V4lStream {
  device: v4l::Device,
  #[borrows(mut device)]
  #[covariant]
  stream: MmapStream<'this, v4l::Device>,
}

/// 以 RGB24 格式采集的 V4L2 设备
pub struct V4lDevice {
  state: Option<V4lStream>,
  width: u32,
  height: u32,
}

fn v4l_error(context: &str, err: std::io::Error) -> InputError {
  InputError::DeviceError(format!("{}: {}", context, err))
}

impl V4lDevice {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();
    let device = v4l::Device::with_path(path).map_err(|e| v4l_error("打开设备失败", e))?;

    let mut format = device.format().map_err(|e| v4l_error("读取格式失败", e))?;
    format.fourcc = v4l::FourCC::new(b"RGB3");
    let format = match device.set_format(&format) {
      Ok(format) => format,
      Err(e) => {
        warn!("设置 RGB24 格式失败: {}", e);
        device.format().map_err(|e| v4l_error("读取格式失败", e))?
      }
    };
    if format.fourcc != v4l::FourCC::new(b"RGB3") {
      return Err(InputError::DeviceError(format!(
        "设备不支持 RGB24 输出: {}",
        format.fourcc
      )));
    }

    let state = V4lStreamTryBuilder {
      device,
      stream_builder: |device| {
        MmapStream::with_buffers(device, Type::VideoCapture, V4L_BUFFER_COUNT)
          .map_err(|e| v4l_error("创建缓冲流失败", e))
      },
    }
    .try_build()?;

    info!(
      "V4L2 设备已打开: {} ({}x{})",
      path.display(),
      format.width,
      format.height
    );

    Ok(Self {
      state: Some(state),
      width: format.width,
      height: format.height,
    })
  }
}

impl CaptureDevice for V4lDevice {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    let Some(state) = self.state.as_mut() else {
      return Ok(None);
    };

    let expected = (self.width * self.height * 3) as usize;
    let (width, height) = (self.width, self.height);
    let data = state.with_mut(|fields| -> Result<Option<Vec<u8>>, InputError> {
      let (buf, _meta) = fields
        .stream
        .next()
        .map_err(|e| v4l_error("采集失败", e))?;
      if buf.len() < expected {
        return Ok(None);
      }
      Ok(Some(buf[..expected].to_vec()))
    })?;

    Ok(data.and_then(|data| RgbImage::from_raw(width, height, data)))
  }

  fn is_opened(&self) -> bool {
    self.state.is_some()
  }

  fn release(&mut self) {
    self.state = None;
  }
}
