use std::error::Error;
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn Error>> {
    // 生成构建信息（构建日期等），供 --version 使用
    EmitBuilder::builder().all_build().emit()?;
    Ok(())
}
