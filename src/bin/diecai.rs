// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/bin/diecai.rs - 命令行入口
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

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use tracing::info;

use diecai::{OverlayKind, RenderOptions, parse_switch};

/// Diecai 预测叠加工具参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像路径
  #[arg(value_name = "IMAGE")]
  pub image: PathBuf,

  /// 预测 JSON 文件路径（缺省时从标准输入读取）
  #[arg(short, long, value_name = "FILE")]
  pub prediction: Option<PathBuf>,

  /// 逐个抠出预测区域，而不是输出单张标注图
  #[arg(short, long)]
  pub extract: bool,

  /// 限定渲染类型（lines、segments、boxes）
  #[arg(short = 't', long = "type", value_name = "NAME")]
  pub kind: Option<OverlayKind>,

  /// 叠加几何的缩放比（缺省按预测声明的尺寸推导）
  #[arg(long, value_name = "FACTOR")]
  pub scale: Option<f64>,

  /// 线条与边框的描边宽度（像素）
  #[arg(long, value_name = "WIDTH")]
  pub line_width: Option<u32>,

  /// 是否渲染文本标签（true/false、yes/no、on/off、1/0）
  #[arg(long, value_name = "SWITCH")]
  pub label: Option<String>,

  /// 只处理给定的分割标签，可多次给出
  #[arg(long, value_name = "ID")]
  pub segments: Vec<u32>,

  /// 反转分割标签选择
  #[arg(long)]
  pub exclude: bool,

  /// 预测声明的参照宽度（像素）
  #[arg(long, value_name = "PIXELS")]
  pub width: Option<u32>,

  /// 预测声明的参照高度（像素）
  #[arg(long, value_name = "PIXELS")]
  pub height: Option<u32>,
}

fn load_prediction(path: Option<&Path>) -> Result<Value> {
  match path {
    Some(path) => {
      let text = fs::read_to_string(path)
        .with_context(|| format!("无法读取预测文件 {}", path.display()))?;
      Ok(serde_json::from_str(&text)?)
    }
    None => {
      let stdin = io::stdin();
      if stdin.is_terminal() {
        bail!("未提供预测数据（用 --prediction 指定文件，或经标准输入传入）");
      }
      let mut buffer = String::new();
      stdin.lock().read_to_string(&mut buffer).context("无法从标准输入读取预测")?;
      Ok(serde_json::from_str(&buffer)?)
    }
  }
}

// 输出文件与输入图像同目录：<主干>-annotate.png 或 <主干>-extract-N.png
fn output_path(image: &Path, suffix: &str) -> PathBuf {
  let stem = image
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| String::from("output"));
  image.with_file_name(format!("{stem}-{suffix}.png"))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入图像: {}", args.image.display());

  let prediction = load_prediction(args.prediction.as_deref())?;

  let label = match args.label.as_deref() {
    Some(text) => match parse_switch(text) {
      Some(flag) => Some(flag),
      None => bail!("无法识别的开关值: {text}"),
    },
    None => None,
  };
  let segments = if args.segments.is_empty() {
    None
  } else {
    Some(args.segments.clone())
  };

  let options = RenderOptions {
    kind: args.kind,
    scale: args.scale,
    colors: None,
    line_width: args.line_width,
    label,
    segments,
    exclude: args.exclude,
    width: args.width,
    height: args.height,
  };

  if args.extract {
    let results = diecai::extract(&prediction, args.image.as_path(), options)?;
    for (index, result) in results.iter().enumerate() {
      let path = output_path(&args.image, &format!("extract-{index}"));
      fs::write(&path, &result.image)
        .with_context(|| format!("无法保存 {}", path.display()))?;
      info!("已保存 {} （标签 {}）", path.display(), result.label);
    }
    info!("共抠出 {} 个区域", results.len());
  } else {
    let bytes = diecai::annotate(&prediction, args.image.as_path(), options)?;
    let path = output_path(&args.image, "annotate");
    fs::write(&path, bytes).with_context(|| format!("无法保存 {}", path.display()))?;
    info!("已保存 {}", path.display());
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_path_sits_beside_the_input() {
    let path = output_path(Path::new("/data/pics/cat.jpg"), "annotate");
    assert_eq!(path, Path::new("/data/pics/cat-annotate.png"));

    let path = output_path(Path::new("dog.png"), "extract-2");
    assert_eq!(path, Path::new("dog-extract-2.png"));
  }
}
