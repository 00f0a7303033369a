//! Ticket lifecycle engine
//!
//! 四个业务组件，只通过共享的 Ticket 记录组合：
//!
//! - [`factory`] - 创建 (票号分配 / 费用计算 / 时间戳)
//! - [`ledger`] - 加时分录 (唯一会抬高费用的操作)
//! - [`refund`] - 全额与按人头部分退款
//! - [`sweeper`] - 过期扫描 (幂等批处理)
//!
//! 纯计算与持久化分离：每个组件提供可独立单测的纯函数，外加一层
//! 读取-应用-写回的 async 服务。

pub mod factory;
pub mod ledger;
pub mod money;
pub mod refund;
pub mod sweeper;
