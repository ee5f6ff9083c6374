// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated SWD target
//!
//! [`SimTarget`] is a [`Transport`] which, instead of driving a wire,
//! answers transactions from an in-memory model of an STM32G0: a SW-DP, one
//! AHB-AP, the Cortex-M0+ core debug registers and AIRCR, and the flash
//! controller.  It allows the whole stack to be exercised without hardware,
//! and can be told to misbehave:
//!
//! * answer WAIT or FAULT to the next transactions,
//! * corrupt the parity of the next reads,
//! * drop off the bus, answering with an undriven line until a line reset,
//! * be slow to power up, halt, erase or program, or never do so,
//! * fail the next flash program operation.
//!
//! It records every transaction, and the address and value of every memory
//! write made through the AP, so tests can check exactly what was sent.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use tinyswd_core::arm::ap::IDR_AHB_AP_CORTEX_M0;
use tinyswd_core::arm::dp::{Abort, CtrlStat, Select};
use tinyswd_core::arm::map::Csw;
use tinyswd_core::arm::register::MemoryRegister;
use tinyswd_core::arm::scs::{
    Aircr, AircrRegister, Dcrsr, DcrdrRegister, DcrsrRegister, DemcrRegister, Dhcsr,
    DhcsrRegister,
};
use tinyswd_core::stm::{
    FlashAcr, FlashAcrRegister, FlashCr, FlashCrRegister, FlashKeyr, FlashKeyrRegister, FlashSr,
    FlashSrRegister, STM32G0_FLASH_BASE,
};

use crate::SwdError;
use crate::protocol::{Ack, Direction, PortType, Transaction, Transport, data_parity};

/// IDCODE of a Cortex-M0+ SW-DP
pub const SIM_IDCODE: u32 = 0x0BC1_1477;

/// ROM table pointer reported by the AP's BASE register
pub const SIM_BASE: u32 = 0xF000_0003;

/// Size of the simulated flash
pub const SIM_FLASH_SIZE: u32 = 64 * 1024;

const ERASED: u32 = 0xFFFF_FFFF;

// FLASH_ACR at reset, before EMPTY is considered
const ACR_RESET: u32 = 0x0000_0600;

// AP register offsets, bank included
const AP_CSW: u8 = 0x00;
const AP_TAR: u8 = 0x04;
const AP_DRW: u8 = 0x0C;
const AP_BD0: u8 = 0x10;
const AP_BD3: u8 = 0x1C;
const AP_BASE: u8 = 0xF8;
const AP_IDR: u8 = 0xFC;

// TAR auto-increment wraps within this boundary
const AUTOINC_BOUNDARY: u32 = 0x400;

const DHCSR: u32 = DhcsrRegister::ADDRESS;
const DCRSR: u32 = DcrsrRegister::ADDRESS;
const DCRDR: u32 = DcrdrRegister::ADDRESS;
const DEMCR: u32 = DemcrRegister::ADDRESS;
const AIRCR: u32 = AircrRegister::ADDRESS;
const FLASH_ACR: u32 = FlashAcrRegister::ADDRESS;
const FLASH_KEYR: u32 = FlashKeyrRegister::ADDRESS;
const FLASH_SR: u32 = FlashSrRegister::ADDRESS;
const FLASH_CR: u32 = FlashCrRegister::ADDRESS;

#[derive(Debug, Default)]
struct SimCore {
    debugen: bool,
    maskints: bool,
    halted: bool,
    // DHCSR reads remaining before a requested halt takes effect
    halt_pending: Option<u32>,
    halt_delay: u32,
    regrdy: bool,
    dcrdr: u32,
    registers: [u32; 32],
    demcr: u32,
}

impl SimCore {
    fn read_dhcsr(&mut self) -> u32 {
        if let Some(remaining) = self.halt_pending {
            if remaining == 0 {
                self.halted = true;
                self.halt_pending = None;
            } else {
                self.halt_pending = Some(remaining - 1);
            }
        }

        let mut value = 0;
        if self.debugen {
            value |= Dhcsr::C_DEBUGEN;
        }
        if self.halted {
            value |= Dhcsr::C_HALT | Dhcsr::S_HALT;
        }
        if self.maskints {
            value |= Dhcsr::C_MASKINTS;
        }
        if self.regrdy {
            value |= Dhcsr::S_REGRDY;
        }
        value
    }

    fn write_dhcsr(&mut self, value: u32) {
        let dhcsr = Dhcsr::new(value);
        if !dhcsr.has_key() {
            trace!("Sim:   DHCSR write without key ignored");
            return;
        }

        self.debugen = dhcsr.c_debugen();
        self.maskints = value & Dhcsr::C_MASKINTS != 0;

        if dhcsr.c_debugen() && dhcsr.c_halt() {
            if !self.halted && self.halt_pending.is_none() {
                if self.halt_delay == 0 {
                    self.halted = true;
                } else {
                    self.halt_pending = Some(self.halt_delay);
                }
            }
        } else {
            self.halted = false;
            self.halt_pending = None;
            self.regrdy = false;
        }
    }

    fn write_dcrsr(&mut self, value: u32) {
        let dcrsr = Dcrsr::from(value);
        if !self.halted {
            self.regrdy = false;
            return;
        }

        let index = usize::from(dcrsr.regsel());
        if dcrsr.is_write() {
            self.registers[index] = self.dcrdr;
        } else {
            self.dcrdr = self.registers[index];
        }
        self.regrdy = true;
    }

    fn reset(&mut self) {
        let halt_delay = self.halt_delay;
        let demcr = self.demcr;
        *self = SimCore {
            halt_delay,
            demcr,
            ..Default::default()
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum KeyStage {
    #[default]
    Key1,
    Key2,
}

#[derive(Debug)]
struct SimFlash {
    words: BTreeMap<u32, u32>,
    acr: u32,
    sr: u32,
    cr: u32,
    locked: bool,
    key_stage: KeyStage,
    // A bad key sequence locks the flash until the next reset
    lockout: bool,
    keyr_writes: usize,
    // First half of a double word, as (offset, value)
    first_word: Option<(u32, u32)>,
    busy_reads: u32,
    pending_eop: bool,
    erase_busy_reads: u32,
    program_busy_reads: u32,
    fail_next: u32,
}

impl Default for SimFlash {
    fn default() -> Self {
        Self {
            words: BTreeMap::new(),
            acr: ACR_RESET | FlashAcr::EMPTY,
            sr: 0,
            cr: 0,
            locked: true,
            key_stage: KeyStage::Key1,
            lockout: false,
            keyr_writes: 0,
            first_word: None,
            busy_reads: 0,
            pending_eop: false,
            erase_busy_reads: 3,
            program_busy_reads: 0,
            fail_next: 0,
        }
    }
}

impl SimFlash {
    fn word(&self, offset: u32) -> u32 {
        self.words.get(&offset).copied().unwrap_or(ERASED)
    }

    fn read_sr(&mut self) -> u32 {
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
            return self.sr | FlashSr::BSY1;
        }
        if self.pending_eop {
            self.pending_eop = false;
            if self.cr & FlashCr::EOPIE != 0 {
                self.sr |= FlashSr::EOP;
            }
        }
        self.sr
    }

    fn write_sr(&mut self, value: u32) {
        self.sr &= !(value & (FlashSr::EOP | FlashSr::ERRORS));
    }

    fn read_cr(&self) -> u32 {
        if self.locked {
            self.cr | FlashCr::LOCK
        } else {
            self.cr
        }
    }

    fn write_cr(&mut self, value: u32) {
        if self.locked {
            trace!("Sim:   FLASH_CR write while locked ignored");
            return;
        }
        if value & FlashCr::LOCK != 0 {
            self.locked = true;
            self.key_stage = KeyStage::Key1;
            self.first_word = None;
            self.cr = value & !(FlashCr::LOCK | FlashCr::STRT);
            return;
        }

        self.cr = value & !FlashCr::STRT;
        if value & FlashCr::PG == 0 {
            self.first_word = None;
        }
        if value & FlashCr::STRT != 0 && value & FlashCr::MER1 != 0 {
            self.words.clear();
            self.start_operation(self.erase_busy_reads);
        }
    }

    fn write_keyr(&mut self, value: u32) {
        self.keyr_writes += 1;
        if self.lockout {
            return;
        }

        let key1: u32 = FlashKeyr::KEY1.into();
        let key2: u32 = FlashKeyr::KEY2.into();
        match (self.locked, self.key_stage) {
            (true, KeyStage::Key1) if value == key1 => self.key_stage = KeyStage::Key2,
            (true, KeyStage::Key2) if value == key2 => {
                self.locked = false;
                self.key_stage = KeyStage::Key1;
            }
            _ => {
                warn!("Sim:   Bad flash key sequence, flash locked until reset");
                self.lockout = true;
                self.locked = true;
            }
        }
    }

    fn write_word(&mut self, offset: u32, value: u32) {
        if self.locked || self.cr & FlashCr::PG == 0 {
            self.sr |= FlashSr::PGSERR;
            return;
        }

        match self.first_word.take() {
            None => {
                if offset % 8 != 0 {
                    self.sr |= FlashSr::PGAERR;
                    return;
                }
                self.first_word = Some((offset, value));
            }
            Some((first_offset, first_value)) => {
                if offset != first_offset + 4 {
                    self.sr |= FlashSr::PGAERR;
                    return;
                }
                if self.fail_next != 0 {
                    self.sr |= self.fail_next;
                    self.fail_next = 0;
                    return;
                }
                if self.word(first_offset) != ERASED || self.word(offset) != ERASED {
                    self.sr |= FlashSr::PROGERR;
                    return;
                }
                self.words.insert(first_offset, first_value);
                self.words.insert(offset, value);
                self.start_operation(self.program_busy_reads);
            }
        }
    }

    fn start_operation(&mut self, busy_reads: u32) {
        self.busy_reads = busy_reads;
        self.pending_eop = true;
    }

    fn is_empty(&self) -> bool {
        self.words.values().all(|word| *word == ERASED)
    }

    fn reset(&mut self) {
        self.acr = if self.is_empty() {
            ACR_RESET | FlashAcr::EMPTY
        } else {
            ACR_RESET
        };
        self.sr = 0;
        self.cr = 0;
        self.locked = true;
        self.key_stage = KeyStage::Key1;
        self.lockout = false;
        self.first_word = None;
        self.busy_reads = 0;
        self.pending_eop = false;
    }
}

/// An in-memory STM32G0 behind a SW-DP
#[derive(Debug)]
pub struct SimTarget {
    idcode: u32,
    closed: bool,
    // False until a line reset, and again after a system reset
    link_up: bool,

    ctrl_stat: u32,
    power_up_countdown: Option<u32>,
    power_up_delay: u32,
    refuse_power_up: bool,
    select: Select,
    rdbuff: u32,

    csw: u32,
    tar: u32,
    memory: BTreeMap<u32, u32>,
    aircr: u32,

    core: SimCore,
    flash: SimFlash,

    waits: u32,
    faults: u32,
    corrupt_reads: u32,

    log: Vec<Transaction>,
    memory_writes: Vec<(u32, u32)>,
    line_resets: usize,
    system_resets: usize,
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTarget {
    /// A powered down target, with erased and locked flash and a running
    /// core.  The link needs a line reset before it answers.
    pub fn new() -> Self {
        Self {
            idcode: SIM_IDCODE,
            closed: false,
            link_up: false,
            ctrl_stat: 0,
            power_up_countdown: None,
            power_up_delay: 0,
            refuse_power_up: false,
            select: Select::default(),
            rdbuff: 0,
            csw: Csw::default().data(),
            tar: 0,
            memory: BTreeMap::new(),
            aircr: 0,
            core: SimCore::default(),
            flash: SimFlash::default(),
            waits: 0,
            faults: 0,
            corrupt_reads: 0,
            log: Vec::new(),
            memory_writes: Vec::new(),
            line_resets: 0,
            system_resets: 0,
        }
    }

    pub fn with_idcode(mut self, idcode: u32) -> Self {
        self.idcode = idcode;
        self
    }

    /// Answers WAIT to the next `count` transactions, without acting on
    /// them.
    pub fn inject_waits(&mut self, count: u32) {
        self.waits = count;
    }

    /// Answers FAULT to the next `count` transactions, without acting on
    /// them.
    pub fn inject_faults(&mut self, count: u32) {
        self.faults = count;
    }

    /// Flips the parity bit of the next `count` successful reads.
    pub fn corrupt_next_reads(&mut self, count: u32) {
        self.corrupt_reads = count;
    }

    /// Stops answering, as if the target had reset, until the next line
    /// reset.
    pub fn sever_link(&mut self) {
        self.link_up = false;
    }

    /// CTRL/STAT reads after a power up request before the acknowledges
    /// appear.
    pub fn set_power_up_delay(&mut self, reads: u32) {
        self.power_up_delay = reads;
    }

    pub fn refuse_power_up(&mut self, refuse: bool) {
        self.refuse_power_up = refuse;
    }

    /// DHCSR reads after a halt request before the core reports halted.
    pub fn set_halt_delay(&mut self, reads: u32) {
        self.core.halt_delay = reads;
    }

    /// FLASH_SR reads which show BSY1 after a mass erase starts.
    pub fn set_erase_busy_reads(&mut self, reads: u32) {
        self.flash.erase_busy_reads = reads;
    }

    /// FLASH_SR reads which show BSY1 after each double word is programmed.
    pub fn set_program_busy_reads(&mut self, reads: u32) {
        self.flash.program_busy_reads = reads;
    }

    /// The next double word programmed sets these FLASH_SR bits instead of
    /// programming.
    pub fn fail_next_program(&mut self, sr_bits: u32) {
        self.flash.fail_next = sr_bits;
    }

    /// Every transaction made, as answered.
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    /// Every memory write made through DRW, as (address, value).
    pub fn memory_writes(&self) -> &[(u32, u32)] {
        &self.memory_writes
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.memory_writes.clear();
    }

    pub fn line_resets(&self) -> usize {
        self.line_resets
    }

    pub fn system_resets(&self) -> usize {
        self.system_resets
    }

    pub fn keyr_writes(&self) -> usize {
        self.flash.keyr_writes
    }

    /// The flash word `offset` bytes in.
    pub fn flash_word(&self, offset: u32) -> u32 {
        self.flash.word(offset)
    }

    pub fn flash_locked(&self) -> bool {
        self.flash.locked
    }

    /// RAM and peripheral words other than those modelled, 0 if never
    /// written.
    pub fn memory_word(&self, address: u32) -> u32 {
        self.memory.get(&address).copied().unwrap_or(0)
    }

    pub fn set_memory_word(&mut self, address: u32, value: u32) {
        self.memory.insert(address, value);
    }

    pub fn core_halted(&self) -> bool {
        self.core.halted
    }

    pub fn core_register(&self, index: usize) -> u32 {
        self.core.registers[index]
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> Result<(), SwdError> {
        if self.closed {
            Err(SwdError::Transport(String::from("simulated target closed")))
        } else {
            Ok(())
        }
    }

    fn powered(&self) -> bool {
        CtrlStat::new(self.ctrl_stat).powered_up()
    }

    // Handles the transaction, filling in read data.  Returns the ack.
    fn respond(&mut self, tx: &mut Transaction) -> Ack {
        if !self.link_up {
            return Ack::Invalid(0b111);
        }
        if self.waits > 0 {
            self.waits -= 1;
            return Ack::Wait;
        }
        if self.faults > 0 {
            self.faults -= 1;
            return Ack::Fault;
        }

        let sticky = self.ctrl_stat & CtrlStat::STICKY_ERRORS != 0;
        match (tx.port, tx.direction, tx.address) {
            (PortType::DebugPort, Direction::Read, 0x0) => tx.data = self.idcode,
            (PortType::DebugPort, Direction::Write, 0x0) => self.write_abort(tx.data),
            (PortType::DebugPort, Direction::Read, 0x4) => tx.data = self.read_ctrl_stat(),
            (PortType::DebugPort, Direction::Write, 0x4) => self.write_ctrl_stat(tx.data),
            _ if sticky => return Ack::Fault,
            (PortType::DebugPort, Direction::Read, 0x8) => tx.data = 0,
            (PortType::DebugPort, Direction::Write, 0x8) => self.select = Select::from(tx.data),
            (PortType::DebugPort, Direction::Read, _) => tx.data = self.rdbuff,
            (PortType::DebugPort, Direction::Write, _) => (),
            (PortType::AccessPort, direction, address) => {
                if !self.powered() {
                    self.ctrl_stat |= CtrlStat::STICKYERR;
                    return Ack::Fault;
                }
                let register = (self.select.apbanksel() << 4) | address;
                match direction {
                    Direction::Read => {
                        let value = self.read_ap(register);
                        tx.data = self.rdbuff;
                        self.rdbuff = value;
                    }
                    Direction::Write => self.write_ap(register, tx.data),
                }
            }
        }
        Ack::Ok
    }

    fn write_abort(&mut self, flags: u32) {
        let abort = Abort::new(flags);
        let mut clear = 0;
        if abort.flags() & Abort::STKCMPCLR != 0 {
            clear |= CtrlStat::STICKYCMP;
        }
        if abort.flags() & Abort::STKERRCLR != 0 {
            clear |= CtrlStat::STICKYERR;
        }
        if abort.flags() & Abort::WDERRCLR != 0 {
            clear |= CtrlStat::WDATAERR;
        }
        if abort.flags() & Abort::ORUNERRCLR != 0 {
            clear |= CtrlStat::STICKYORUN;
        }
        self.ctrl_stat &= !clear;
    }

    fn read_ctrl_stat(&mut self) -> u32 {
        if let Some(remaining) = self.power_up_countdown {
            if self.refuse_power_up {
                // Never acknowledged
            } else if remaining == 0 {
                self.ctrl_stat |= CtrlStat::CDBGPWRUPACK | CtrlStat::CSYSPWRUPACK;
                self.power_up_countdown = None;
            } else {
                self.power_up_countdown = Some(remaining - 1);
            }
        }
        self.ctrl_stat
    }

    fn write_ctrl_stat(&mut self, value: u32) {
        let requests = CtrlStat::CDBGPWRUPREQ | CtrlStat::CSYSPWRUPREQ;
        let acks = CtrlStat::CDBGPWRUPACK | CtrlStat::CSYSPWRUPACK;
        let sticky = self.ctrl_stat & CtrlStat::STICKY_ERRORS;

        if value & requests == requests {
            if self.ctrl_stat & acks != acks && self.power_up_countdown.is_none() {
                self.power_up_countdown = Some(self.power_up_delay);
            }
            self.ctrl_stat = (self.ctrl_stat & acks) | requests | sticky;
        } else {
            self.power_up_countdown = None;
            self.ctrl_stat = (value & requests) | sticky;
        }
    }

    fn read_ap(&mut self, register: u8) -> u32 {
        if self.select.apsel() != 0 {
            return 0;
        }
        match register {
            AP_CSW => self.csw | Csw::DEVICE_EN,
            AP_TAR => self.tar,
            AP_DRW => {
                let value = self.read_memory(self.tar);
                self.increment_tar();
                value
            }
            AP_BD0..=AP_BD3 => self.read_memory((self.tar & !0xF) | u32::from(register & 0xC)),
            AP_BASE => SIM_BASE,
            AP_IDR => IDR_AHB_AP_CORTEX_M0.data(),
            _ => 0,
        }
    }

    fn write_ap(&mut self, register: u8, value: u32) {
        if self.select.apsel() != 0 {
            return;
        }
        match register {
            AP_CSW => self.csw = value & !Csw::TR_IN_PROG,
            AP_TAR => self.tar = value,
            AP_DRW => {
                self.write_memory(self.tar, value);
                self.increment_tar();
            }
            AP_BD0..=AP_BD3 => {
                self.write_memory((self.tar & !0xF) | u32::from(register & 0xC), value)
            }
            _ => (),
        }
    }

    fn increment_tar(&mut self) {
        if Csw::new(self.csw).addrinc() == Csw::ADDRINC_SINGLE {
            let offset = (self.tar + 4) % AUTOINC_BOUNDARY;
            self.tar = (self.tar & !(AUTOINC_BOUNDARY - 1)) | offset;
        }
    }

    fn flash_offset(address: u32) -> Option<u32> {
        address
            .checked_sub(STM32G0_FLASH_BASE)
            .filter(|offset| *offset < SIM_FLASH_SIZE)
    }

    fn read_memory(&mut self, address: u32) -> u32 {
        if let Some(offset) = Self::flash_offset(address) {
            return self.flash.word(offset & !0x3);
        }
        match address {
            DHCSR => self.core.read_dhcsr(),
            DCRDR => self.core.dcrdr,
            DEMCR => self.core.demcr,
            AIRCR => Aircr::VECTKEYSTAT | (self.aircr & 0xFFFF & !Aircr::SYSRESETREQ),
            FLASH_ACR => self.flash.acr,
            FLASH_SR => self.flash.read_sr(),
            FLASH_CR => self.flash.read_cr(),
            DCRSR | FLASH_KEYR => 0,
            _ => self.memory_word(address),
        }
    }

    fn write_memory(&mut self, address: u32, value: u32) {
        trace!("Sim:   Write 0x{address:08X} = 0x{value:08X}");
        self.memory_writes.push((address, value));

        if let Some(offset) = Self::flash_offset(address) {
            self.flash.write_word(offset, value);
            return;
        }
        match address {
            DHCSR => self.core.write_dhcsr(value),
            DCRSR => self.core.write_dcrsr(value),
            DCRDR => self.core.dcrdr = value,
            DEMCR => self.core.demcr = value,
            AIRCR => self.write_aircr(value),
            FLASH_ACR => self.flash.acr = value,
            FLASH_KEYR => self.flash.write_keyr(value),
            FLASH_SR => self.flash.write_sr(value),
            FLASH_CR => self.flash.write_cr(value),
            _ => self.set_memory_word(address, value),
        }
    }

    fn write_aircr(&mut self, value: u32) {
        let aircr = Aircr::new(value);
        if !aircr.has_key() {
            return;
        }
        if aircr.sysresetreq() {
            self.system_reset();
        } else {
            self.aircr = value & 0xFFFF;
        }
    }

    fn system_reset(&mut self) {
        debug!("Sim:   System reset");
        self.system_resets += 1;
        self.link_up = false;
        self.select = Select::default();
        self.ctrl_stat = 0;
        self.power_up_countdown = None;
        self.rdbuff = 0;
        self.core.reset();
        self.flash.reset();
    }
}

impl Transport for SimTarget {
    fn line_reset(&mut self) -> Result<(), SwdError> {
        self.check_open()?;
        self.line_resets += 1;
        self.link_up = true;
        Ok(())
    }

    fn transmit(&mut self, mut transaction: Transaction) -> Result<Transaction, SwdError> {
        self.check_open()?;

        transaction.ack = self.respond(&mut transaction);
        if transaction.is_read() {
            if transaction.ack == Ack::Ok {
                transaction.parity = data_parity(transaction.data);
                if self.corrupt_reads > 0 {
                    self.corrupt_reads -= 1;
                    transaction.parity = !transaction.parity;
                }
            } else {
                transaction.data = 0;
                transaction.parity = false;
            }
        }

        self.log.push(transaction);
        Ok(transaction)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
