//! Device driver implementations, generic over the `hal` interfaces. They
//! offer a safe API and contain no register access; the peripheral side of
//! each bus is supplied by the integrator through the corresponding trait.

pub mod led;

pub mod winbond {
    pub mod w25q256jv;
}
